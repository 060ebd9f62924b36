use std::collections::HashSet;

use mantle_document::{Array, Document, Value, decode_document, encode_document};

use crate::error::WireError;

/// Flag bits of an `OP_MSG` body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct MsgFlags(u32);

impl MsgFlags {
    pub const CHECKSUM_PRESENT: u32 = 1 << 0;
    pub const MORE_TO_COME: u32 = 1 << 1;
    pub const EXHAUST_ALLOWED: u32 = 1 << 16;

    /// The low 16 bits must be understood by the receiver.
    const REQUIRED_MASK: u32 = 0xffff;
    const KNOWN: u32 = Self::CHECKSUM_PRESENT | Self::MORE_TO_COME | Self::EXHAUST_ALLOWED;

    pub fn from_bits(bits: u32) -> Result<Self, WireError> {
        let unknown_required = bits & Self::REQUIRED_MASK & !Self::KNOWN;
        if unknown_required != 0 {
            return Err(WireError::malformed(format!(
                "unknown required flag bits {unknown_required:#x}"
            )));
        }
        Ok(Self(bits))
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    pub const fn with(self, flag: u32) -> Self {
        Self(self.0 | flag)
    }

    pub const fn without(self, flag: u32) -> Self {
        Self(self.0 & !flag)
    }
}

/// A kind-1 section: a named run of documents.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSequence {
    pub identifier: String,
    pub documents: Vec<Document>,
}

/// One section of an `OP_MSG`, in wire order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Section<'a> {
    Body(&'a Document),
    Sequence(&'a DocumentSequence),
}

/// An `OP_MSG` body: flags, exactly one body document, any number of
/// uniquely named document sequences, and an optional checksum.
#[derive(Debug, Clone, PartialEq)]
pub struct OpMsg {
    flags: MsgFlags,
    body: Document,
    /// Number of sequences that precede the body section on the wire.
    body_position: usize,
    sequences: Vec<DocumentSequence>,
    checksum: Option<u32>,
}

const KIND_BODY: u8 = 0;
const KIND_SEQUENCE: u8 = 1;

impl OpMsg {
    /// A message holding just `body`.
    pub fn new(body: Document) -> Self {
        Self {
            flags: MsgFlags::default(),
            body,
            body_position: 0,
            sequences: Vec::new(),
            checksum: None,
        }
    }

    /// Appends a kind-1 section after the existing ones.
    pub fn push_sequence(&mut self, sequence: DocumentSequence) -> Result<(), WireError> {
        if self
            .sequences
            .iter()
            .any(|s| s.identifier == sequence.identifier)
        {
            return Err(WireError::malformed(format!(
                "duplicate document sequence {:?}",
                sequence.identifier
            )));
        }
        self.sequences.push(sequence);
        Ok(())
    }

    pub fn with_flags(mut self, flags: MsgFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn flags(&self) -> MsgFlags {
        self.flags
    }

    pub fn checksum(&self) -> Option<u32> {
        self.checksum
    }

    pub fn more_to_come(&self) -> bool {
        self.flags.contains(MsgFlags::MORE_TO_COME)
    }

    /// The kind-0 document.
    pub fn body(&self) -> &Document {
        &self.body
    }

    pub fn into_body(self) -> Document {
        self.body
    }

    pub fn sequences(&self) -> &[DocumentSequence] {
        &self.sequences
    }

    /// All sections in wire order.
    pub fn sections(&self) -> Vec<Section<'_>> {
        let mut out = Vec::with_capacity(self.sequences.len() + 1);
        out.extend(self.sequences[..self.body_position].iter().map(Section::Sequence));
        out.push(Section::Body(&self.body));
        out.extend(self.sequences[self.body_position..].iter().map(Section::Sequence));
        out
    }

    /// The body with each document sequence folded in as an array field
    /// named by its identifier.
    pub fn document(&self) -> Result<Document, WireError> {
        let mut doc = self.body.clone();
        for seq in &self.sequences {
            if doc.contains_key(&seq.identifier) {
                return Err(WireError::malformed(format!(
                    "document sequence {:?} collides with a body field",
                    seq.identifier
                )));
            }
            let items: Array = seq.documents.iter().cloned().map(Value::Document).collect();
            doc.set(seq.identifier.clone(), items);
        }
        Ok(doc)
    }

    /// Appends the encoded body (flags through checksum) to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), WireError> {
        let flags = match self.checksum {
            Some(_) => self.flags.with(MsgFlags::CHECKSUM_PRESENT),
            None => self.flags.without(MsgFlags::CHECKSUM_PRESENT),
        };
        out.extend_from_slice(&flags.bits().to_le_bytes());

        for section in self.sections() {
            match section {
                Section::Body(doc) => {
                    out.push(KIND_BODY);
                    encode_document(doc, out)?;
                }
                Section::Sequence(seq) => {
                    out.push(KIND_SEQUENCE);
                    let start = out.len();
                    out.extend_from_slice(&[0; 4]);
                    if seq.identifier.as_bytes().contains(&0) {
                        return Err(WireError::malformed("sequence identifier contains NUL"));
                    }
                    out.extend_from_slice(seq.identifier.as_bytes());
                    out.push(0);
                    for doc in &seq.documents {
                        encode_document(doc, out)?;
                    }
                    let size = i32::try_from(out.len() - start)
                        .map_err(|_| WireError::malformed("document sequence too large"))?;
                    out[start..start + 4].copy_from_slice(&size.to_le_bytes());
                }
            }
        }

        if let Some(checksum) = self.checksum {
            out.extend_from_slice(&checksum.to_le_bytes());
        }
        Ok(())
    }

    /// Parses a complete body (everything after the header).
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let flag_bytes: [u8; 4] = bytes
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| WireError::malformed("body shorter than flag bits"))?;
        let flags = MsgFlags::from_bits(u32::from_le_bytes(flag_bytes))?;

        let (end, checksum) = if flags.contains(MsgFlags::CHECKSUM_PRESENT) {
            let end = bytes
                .len()
                .checked_sub(4)
                .filter(|&end| end >= 4)
                .ok_or_else(|| WireError::malformed("checksum flag set but no checksum"))?;
            let sum = u32::from_le_bytes([bytes[end], bytes[end + 1], bytes[end + 2], bytes[end + 3]]);
            (end, Some(sum))
        } else {
            (bytes.len(), None)
        };

        let mut body = None;
        let mut body_position = 0;
        let mut sequences: Vec<DocumentSequence> = Vec::new();
        let mut identifiers = HashSet::new();
        let mut pos = 4;

        while pos < end {
            let kind = bytes[pos];
            pos += 1;
            match kind {
                KIND_BODY => {
                    let (doc, used) = decode_document(&bytes[pos..end])?;
                    if body.is_some() {
                        return Err(WireError::malformed("more than one kind-0 section"));
                    }
                    body = Some(doc);
                    body_position = sequences.len();
                    pos += used;
                }
                KIND_SEQUENCE => {
                    let (seq, used) = decode_sequence(&bytes[pos..end])?;
                    if !identifiers.insert(seq.identifier.clone()) {
                        return Err(WireError::malformed(format!(
                            "duplicate document sequence {:?}",
                            seq.identifier
                        )));
                    }
                    sequences.push(seq);
                    pos += used;
                }
                other => {
                    return Err(WireError::malformed(format!("unknown section kind {other}")));
                }
            }
        }

        let body = body.ok_or_else(|| WireError::malformed("missing kind-0 section"))?;
        Ok(Self {
            flags,
            body,
            body_position,
            sequences,
            checksum,
        })
    }
}

/// Decodes one kind-1 section (after its kind byte), returning it and the
/// number of bytes consumed.
fn decode_sequence(bytes: &[u8]) -> Result<(DocumentSequence, usize), WireError> {
    let size_bytes: [u8; 4] = bytes
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| WireError::malformed("truncated document sequence size"))?;
    let size = i32::from_le_bytes(size_bytes);
    if size < 5 {
        return Err(WireError::malformed(format!("invalid document sequence size {size}")));
    }
    let size = size as usize;
    let section = bytes.get(..size).ok_or_else(|| {
        WireError::malformed(format!(
            "document sequence size {size} exceeds remaining {} bytes",
            bytes.len()
        ))
    })?;

    let rest = &section[4..];
    let nul = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| WireError::malformed("unterminated document sequence identifier"))?;
    let identifier = std::str::from_utf8(&rest[..nul])
        .map_err(|e| WireError::malformed(format!("invalid sequence identifier: {e}")))?
        .to_string();

    let mut documents = Vec::new();
    let mut pos = 4 + nul + 1;
    while pos < size {
        let remaining = size - pos;
        if remaining < 5 {
            return Err(WireError::TrailingData(remaining));
        }
        let (doc, used) = decode_document(&section[pos..])?;
        documents.push(doc);
        pos += used;
    }

    Ok((DocumentSequence { identifier, documents }, size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mantle_document::doc;

    fn encoded(msg: &OpMsg) -> Vec<u8> {
        let mut out = Vec::new();
        msg.encode(&mut out).unwrap();
        out
    }

    #[test]
    fn single_body_layout() {
        let msg = OpMsg::new(doc! { "ping" => 1 });
        let bytes = encoded(&msg);
        assert_eq!(bytes[..4], [0, 0, 0, 0]);
        assert_eq!(bytes[4], 0);
        assert_eq!(OpMsg::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn sequences_keep_their_position() {
        let mut msg = OpMsg::new(doc! { "insert" => "actor", "$db" => "test" });
        msg.push_sequence(DocumentSequence {
            identifier: "documents".into(),
            documents: vec![doc! { "a" => 1 }, doc! { "a" => 2 }],
        })
        .unwrap();
        let bytes = encoded(&msg);
        let decoded = OpMsg::decode(&bytes).unwrap();
        assert_eq!(decoded, msg);
        assert!(matches!(decoded.sections()[0], Section::Body(_)));
        assert!(matches!(decoded.sections()[1], Section::Sequence(_)));

        let merged = decoded.document().unwrap();
        assert_eq!(merged.first_key(), Some("insert"));
        assert_eq!(merged.get_array("documents").unwrap().len(), 2);
    }

    #[test]
    fn rejects_two_body_sections() {
        let mut bytes = encoded(&OpMsg::new(doc! { "a" => 1 }));
        let mut extra = vec![0u8];
        extra.extend(doc! { "b" => 1 }.to_bytes().unwrap());
        bytes.extend(extra);
        assert!(matches!(
            OpMsg::decode(&bytes),
            Err(WireError::MalformedMessage(msg)) if msg.contains("kind-0")
        ));
    }

    #[test]
    fn rejects_missing_body() {
        let bytes = 0u32.to_le_bytes();
        assert!(OpMsg::decode(&bytes).is_err());
    }

    #[test]
    fn rejects_duplicate_sequence_identifiers() {
        let mut msg = OpMsg::new(doc! { "x" => 1 });
        let seq = DocumentSequence {
            identifier: "docs".into(),
            documents: vec![],
        };
        msg.push_sequence(seq.clone()).unwrap();
        assert!(msg.push_sequence(seq).is_err());
    }

    #[test]
    fn rejects_unknown_required_flags() {
        let mut bytes = encoded(&OpMsg::new(doc! { "a" => 1 }));
        bytes[0] = 0x04;
        assert!(matches!(
            OpMsg::decode(&bytes),
            Err(WireError::MalformedMessage(_))
        ));
        // Optional bits above 16 are tolerated.
        bytes[0] = 0;
        bytes[3] = 0x01;
        assert!(OpMsg::decode(&bytes).is_ok());
    }

    #[test]
    fn checksum_is_carried_verbatim() {
        let mut bytes = encoded(&OpMsg::new(doc! { "a" => 1 }));
        bytes[0] = 0x01;
        bytes.extend(0xdead_beef_u32.to_le_bytes());
        let msg = OpMsg::decode(&bytes).unwrap();
        assert_eq!(msg.checksum(), Some(0xdead_beef));
        assert_eq!(encoded(&msg), bytes);
    }

    #[test]
    fn partial_document_in_sequence_is_trailing_data() {
        let mut msg = OpMsg::new(doc! { "a" => 1 });
        msg.push_sequence(DocumentSequence {
            identifier: "d".into(),
            documents: vec![doc! {}],
        })
        .unwrap();
        let mut bytes = encoded(&msg);
        // Grow the declared sequence size by three junk bytes.
        let seq_start = 4 + 1 + 12 + 1;
        let size = i32::from_le_bytes(bytes[seq_start..seq_start + 4].try_into().unwrap());
        bytes[seq_start..seq_start + 4].copy_from_slice(&(size + 3).to_le_bytes());
        bytes.extend([1, 2, 3]);
        assert!(matches!(OpMsg::decode(&bytes), Err(WireError::TrailingData(3))));
    }

    #[test]
    fn merge_rejects_collisions() {
        let mut msg = OpMsg::new(doc! { "documents" => 1 });
        msg.push_sequence(DocumentSequence {
            identifier: "documents".into(),
            documents: vec![],
        })
        .unwrap();
        assert!(msg.document().is_err());
    }
}
