//! The built-in command set.

mod admin;
mod collection;
mod common;
mod data;
mod database;

use crate::dispatch::CommandTable;

pub use admin::VERSION;

const HANDLERS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::handlers");

/// Every command the server answers in direct mode.
pub fn standard_table() -> CommandTable {
    CommandTable::builder()
        // handshake and administration
        .command("hello", "Returns the server's role and limits.", admin::hello)
        .command("isMaster", "Legacy name of hello.", admin::hello)
        .command("ismaster", "Legacy name of hello.", admin::hello)
        .command("ping", "Checks that the server is responsive.", admin::ping)
        .command("buildInfo", "Returns build details.", admin::build_info)
        .command("buildinfo", "Returns build details.", admin::build_info)
        .command("getParameter", "Returns server parameters.", admin::get_parameter)
        .command("getLog", "Returns recent log lines.", admin::get_log)
        .command("hostInfo", "Returns host details.", admin::host_info)
        .command("listCommands", "Lists supported commands.", admin::list_commands)
        .command("serverStatus", "Returns process status and counters.", admin::server_status)
        .command("whatsmyuri", "Returns the caller's address.", admin::whats_my_uri)
        // databases
        .command("listDatabases", "Lists databases with their sizes.", database::list_databases)
        .command("dropDatabase", "Drops the current database.", database::drop_database)
        .command("dbStats", "Returns database statistics.", database::db_stats)
        .command("dbstats", "Returns database statistics.", database::db_stats)
        // collections
        .command("create", "Creates a collection.", collection::create)
        .command("drop", "Drops a collection.", collection::drop)
        .command("listCollections", "Lists collections in the database.", collection::list_collections)
        .command("collStats", "Returns collection statistics.", collection::coll_stats)
        .command("dataSize", "Returns the size of a namespace.", collection::data_size)
        // documents
        .command("insert", "Inserts documents.", data::insert)
        .command("delete", "Deletes documents matching filters.", data::delete)
        .command("find", "Returns documents matching a filter.", data::find)
        .command("count", "Counts documents matching a filter.", data::count)
        .build()
}
