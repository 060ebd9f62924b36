use mantle_document::{Array, DateTime, Document, Value, array, doc};
use mantle_wire::MAX_MESSAGE_LEN;

use crate::dispatch::{CommandError, ErrorCode, Request};

use super::common::{int32, int64};

/// Server version reported to drivers.
pub const VERSION: &str = "5.0.42";
const VERSION_ARRAY: [i32; 4] = [5, 0, 42, 0];
const MAX_BSON_OBJECT_SIZE: i32 = 16 * 1024 * 1024;
const MAX_WRITE_BATCH_SIZE: i32 = 100_000;
const WIRE_VERSION: i32 = 13;

pub(crate) fn hello(_: &Request<'_>) -> Result<Document, CommandError> {
    Ok(doc! {
        "helloOk" => true,
        "ismaster" => true,
        "maxBsonObjectSize" => MAX_BSON_OBJECT_SIZE,
        "maxMessageSizeBytes" => MAX_MESSAGE_LEN as i32,
        "maxWriteBatchSize" => MAX_WRITE_BATCH_SIZE,
        "localTime" => DateTime::now(),
        "minWireVersion" => WIRE_VERSION,
        "maxWireVersion" => WIRE_VERSION,
        "readOnly" => false,
    })
}

pub(crate) fn ping(_: &Request<'_>) -> Result<Document, CommandError> {
    Ok(Document::new())
}

pub(crate) fn build_info(_: &Request<'_>) -> Result<Document, CommandError> {
    Ok(doc! {
        "version" => VERSION,
        "gitVersion" => option_env!("MANTLE_GIT_VERSION").unwrap_or("unknown"),
        "modules" => Array::new(),
        "sysInfo" => "deprecated",
        "versionArray" => VERSION_ARRAY.iter().copied().map(Value::from).collect::<Array>(),
        "bits" => (usize::BITS as i32),
        "debug" => cfg!(debug_assertions),
        "maxBsonObjectSize" => MAX_BSON_OBJECT_SIZE,
        "buildEnvironment" => Document::new(),
    })
}

pub(crate) fn get_parameter(_: &Request<'_>) -> Result<Document, CommandError> {
    Ok(doc! { "version" => VERSION })
}

pub(crate) fn get_log(req: &Request<'_>) -> Result<Document, CommandError> {
    let which = match req.command_value() {
        Some(Value::String(s)) => s.as_str(),
        Some(other) => {
            return Err(CommandError::new(
                ErrorCode::TypeMismatch,
                format!("Argument to getLog must be of type String; found {}", other.kind().name()),
            ));
        }
        None => "",
    };

    match which {
        "*" => Ok(doc! { "names" => array!["global", "startupWarnings"] }),
        "global" => Ok(doc! { "totalLinesWritten" => 0, "log" => Array::new() }),
        "startupWarnings" => {
            let line = format!(
                "{{\"t\":{{\"$date\":{}}},\"s\":\"I\",\"c\":\"STORAGE\",\"msg\":\"Powered by mantle {} and the memory backend.\"}}",
                DateTime::now().timestamp_millis(),
                env!("CARGO_PKG_VERSION"),
            );
            Ok(doc! { "totalLinesWritten" => 1, "log" => array![line] })
        }
        other => Err(CommandError::new(
            ErrorCode::BadValue,
            format!("no RecentLogs named: {other}"),
        )),
    }
}

pub(crate) fn host_info(_: &Request<'_>) -> Result<Document, CommandError> {
    let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
    Ok(doc! {
        "system" => doc! {
            "currentTime" => DateTime::now(),
            "hostname" => hostname(),
            "cpuAddrSize" => (usize::BITS as i32),
            "numCores" => int32(cores),
            "cpuArch" => std::env::consts::ARCH,
            "numaEnabled" => false,
        },
        "os" => doc! { "type" => os_type() },
    })
}

pub(crate) fn list_commands(req: &Request<'_>) -> Result<Document, CommandError> {
    let mut commands = Document::new();
    for command in req.table().iter() {
        commands.set(command.name, doc! { "help" => command.help });
    }
    Ok(doc! { "commands" => commands })
}

pub(crate) fn server_status(req: &Request<'_>) -> Result<Document, CommandError> {
    let uptime = req.started().elapsed();
    let collections: usize = req
        .storage()
        .list_databases()?
        .iter()
        .map(|db| db.collections)
        .sum();

    Ok(doc! {
        "host" => hostname(),
        "version" => VERSION,
        "process" => env!("CARGO_PKG_NAME"),
        "pid" => i64::from(std::process::id()),
        "uptime" => int64(uptime.as_secs()),
        "uptimeMillis" => int64(uptime.as_millis()),
        "uptimeEstimate" => int64(uptime.as_secs()),
        "localTime" => DateTime::now(),
        "catalogStats" => doc! {
            "collections" => int32(collections),
            "capped" => 0,
            "timeseries" => 0,
            "views" => 0,
            "internalCollections" => 0,
            "internalViews" => 0,
        },
        "freeMonitoring" => doc! { "state" => "disabled" },
        "metrics" => req.metrics().snapshot().to_document(),
    })
}

pub(crate) fn whats_my_uri(req: &Request<'_>) -> Result<Document, CommandError> {
    let you = req.peer.map(|p| p.to_string()).unwrap_or_default();
    Ok(doc! { "you" => you })
}

fn hostname() -> String {
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "localhost".to_string())
}

fn os_type() -> &'static str {
    match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "Darwin",
        "windows" => "Windows",
        other => other,
    }
}
