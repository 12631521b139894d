//! Record framing and the sequential record decoder.
//!
//! A snapshot is a plain concatenation of records with no length prefix or
//! trailer. Each record starts with a 4-byte little-endian signed class id and
//! a 4-byte unsigned instance id; the rest belongs to the object.

use crate::object::Object;
use crate::registry::TypeRegistry;
use ember_common::{ByteReader, ByteWriter, ClassId, CoreError, InstanceId};

/// Size of a record header in bytes.
pub const RECORD_HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub class_id: ClassId,
    pub instance_id: InstanceId,
}

impl RecordHeader {
    pub fn write(&self, out: &mut ByteWriter) {
        out.write_i32(self.class_id.0);
        out.write_u32(self.instance_id.0);
    }

    pub fn read(input: &mut ByteReader<'_>) -> Result<Self, CoreError> {
        if input.remaining() < RECORD_HEADER_LEN {
            return Err(CoreError::Truncated {
                needed: RECORD_HEADER_LEN,
                remaining: input.remaining(),
            });
        }
        let class_id = ClassId(input.read_i32()?);
        let instance_id = InstanceId(input.read_u32()?);
        Ok(Self {
            class_id,
            instance_id,
        })
    }
}

/// An object rebuilt from one record, with its references still unresolved.
pub struct RawRecord {
    pub header: RecordHeader,
    pub object: Box<dyn Object>,
}

/// Yields one [`RawRecord`] per record until the input is exhausted.
///
/// The sequence is finite and cannot be restarted; after the first error
/// it yields nothing more.
pub struct RecordDecoder<'r, 'a> {
    input: &'r mut ByteReader<'a>,
    registry: &'r TypeRegistry,
    failed: bool,
}

impl<'r, 'a> RecordDecoder<'r, 'a> {
    pub fn new(input: &'r mut ByteReader<'a>, registry: &'r TypeRegistry) -> Self {
        Self {
            input,
            registry,
            failed: false,
        }
    }

    fn decode_one(&mut self) -> Result<RawRecord, CoreError> {
        let class_id = ClassId(self.input.peek_i32()?);
        let mut object = self.registry.create(class_id)?;
        let header = RecordHeader::read(self.input)?;
        if !header.instance_id.is_valid() {
            return Err(CoreError::Malformed(format!(
                "record of class {class_id} has instance id 0"
            )));
        }
        object.read(self.input)?;
        Ok(RawRecord { header, object })
    }
}

impl Iterator for RecordDecoder<'_, '_> {
    type Item = Result<RawRecord, CoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.input.is_empty() {
            return None;
        }
        let record = self.decode_one();
        if record.is_err() {
            self.failed = true;
        }
        Some(record)
    }
}
