//! Stream decoder.

use super::{END_MARKER, MAGIC, NULL_TAG, ProtocolError, ROW_MARKER, StreamHeader, VERSION};
use byteorder::{BigEndian, ReadBytesExt};
use std::io::Read;
use tapline_common::types::{ColumnMeta, LogicalType, Row, RowSchema, Value};

/// Upper bound on a single string, guarding against corrupt lengths.
const MAX_STRING_LEN: u32 = 64 * 1024 * 1024;

/// Reads a service stream.
pub struct ServiceStreamReader<R: Read> {
    inner: R,
    columns: Option<usize>,
    ended: bool,
}

impl<R: Read> ServiceStreamReader<R> {
    /// Wraps a reader.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            columns: None,
            ended: false,
        }
    }

    /// Reads the header and schema.
    pub fn read_header(&mut self) -> Result<StreamHeader, ProtocolError> {
        let mut magic = [0u8; 4];
        self.inner.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(ProtocolError::Malformed("bad magic".to_string()));
        }
        let version = self.inner.read_u8()?;
        if version != VERSION {
            return Err(ProtocolError::Malformed(format!(
                "unsupported version {version}"
            )));
        }
        let service_name = read_str(&mut self.inner)?;
        let service_pipeline_id = read_str(&mut self.inner)?;
        let result_pipeline_id = read_str(&mut self.inner)?;

        let count = self.inner.read_u32::<BigEndian>()?;
        let mut columns = Vec::new();
        for _ in 0..count {
            let name = read_str(&mut self.inner)?;
            let tag = self.inner.read_u8()?;
            let ty = LogicalType::from_tag(tag)
                .ok_or_else(|| ProtocolError::Malformed(format!("unknown type tag {tag}")))?;
            columns.push(ColumnMeta::new(name, ty));
        }
        self.columns = Some(columns.len());

        Ok(StreamHeader {
            service_name,
            service_pipeline_id,
            result_pipeline_id,
            schema: RowSchema::new(columns),
        })
    }

    /// Reads the next row, or `None` at the end marker.
    pub fn next_row(&mut self) -> Result<Option<Row>, ProtocolError> {
        if self.ended {
            return Ok(None);
        }
        let columns = self
            .columns
            .ok_or_else(|| ProtocolError::Malformed("header not read".to_string()))?;
        match self.inner.read_u8()? {
            END_MARKER => {
                self.ended = true;
                Ok(None)
            }
            ROW_MARKER => {
                let values = (0..columns)
                    .map(|_| read_value(&mut self.inner))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Some(Row::new(values)))
            }
            other => Err(ProtocolError::Malformed(format!("unexpected marker {other:#04x}"))),
        }
    }

    /// Iterates over the remaining rows.
    pub fn rows(&mut self) -> impl Iterator<Item = Result<Row, ProtocolError>> + '_ {
        std::iter::from_fn(move || self.next_row().transpose())
    }
}

fn read_str<R: Read>(r: &mut R) -> Result<String, ProtocolError> {
    let len = r.read_u32::<BigEndian>()?;
    if len > MAX_STRING_LEN {
        return Err(ProtocolError::Malformed(format!("string length {len} too large")));
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

fn read_value<R: Read>(r: &mut R) -> Result<Value, ProtocolError> {
    let tag = r.read_u8()?;
    if tag == NULL_TAG {
        return Ok(Value::Null);
    }
    let ty = LogicalType::from_tag(tag)
        .ok_or_else(|| ProtocolError::Malformed(format!("unknown type tag {tag}")))?;
    Ok(match ty {
        LogicalType::Bool => Value::Bool(r.read_u8()? != 0),
        LogicalType::Int64 => Value::Int64(r.read_i64::<BigEndian>()?),
        LogicalType::Float64 => Value::Float64(r.read_f64::<BigEndian>()?),
        LogicalType::String => Value::from(read_str(r)?),
        LogicalType::Date => {
            let days = r.read_i32::<BigEndian>()?;
            Value::from_epoch_days(days)
                .ok_or_else(|| ProtocolError::Malformed(format!("day {days} out of range")))?
        }
    })
}
