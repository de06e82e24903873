//! Stream encoder.

use super::{END_MARKER, MAGIC, NULL_TAG, ProtocolError, ROW_MARKER, StreamHeader, VERSION};
use byteorder::{BigEndian, WriteBytesExt};
use std::io::Write;
use tapline_common::types::{Row, Value};

/// Writes a service stream.
pub struct ServiceStreamWriter<W: Write> {
    inner: W,
    columns: Option<usize>,
    rows_written: u64,
}

impl<W: Write> ServiceStreamWriter<W> {
    /// Wraps a writer.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            columns: None,
            rows_written: 0,
        }
    }

    /// Writes the header and schema. Must come first, exactly once.
    pub fn write_header(&mut self, header: &StreamHeader) -> Result<(), ProtocolError> {
        if self.columns.is_some() {
            return Err(ProtocolError::Malformed("header already written".to_string()));
        }
        self.inner.write_all(MAGIC)?;
        self.inner.write_u8(VERSION)?;
        write_str(&mut self.inner, &header.service_name)?;
        write_str(&mut self.inner, &header.service_pipeline_id)?;
        write_str(&mut self.inner, &header.result_pipeline_id)?;

        let columns = header.schema.columns();
        self.inner.write_u32::<BigEndian>(columns.len() as u32)?;
        for column in columns {
            write_str(&mut self.inner, &column.name)?;
            self.inner.write_u8(column.logical_type.tag())?;
        }
        self.columns = Some(columns.len());
        Ok(())
    }

    /// Writes one row.
    pub fn write_row(&mut self, row: &Row) -> Result<(), ProtocolError> {
        let expected = self
            .columns
            .ok_or_else(|| ProtocolError::Malformed("row written before header".to_string()))?;
        if row.len() != expected {
            return Err(ProtocolError::RowWidth {
                expected,
                found: row.len(),
            });
        }
        self.inner.write_u8(ROW_MARKER)?;
        for value in row.values() {
            write_value(&mut self.inner, value)?;
        }
        self.rows_written += 1;
        Ok(())
    }

    /// Returns the number of rows written so far.
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Writes the end marker, flushes, and returns the inner writer.
    pub fn finish(mut self) -> Result<W, ProtocolError> {
        if self.columns.is_none() {
            return Err(ProtocolError::Malformed("stream has no header".to_string()));
        }
        self.inner.write_u8(END_MARKER)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

fn write_str<W: Write>(w: &mut W, s: &str) -> Result<(), ProtocolError> {
    let len = u32::try_from(s.len())
        .map_err(|_| ProtocolError::Malformed(format!("string of {} bytes is too long", s.len())))?;
    w.write_u32::<BigEndian>(len)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

fn write_value<W: Write>(w: &mut W, value: &Value) -> Result<(), ProtocolError> {
    let Some(ty) = value.logical_type() else {
        w.write_u8(NULL_TAG)?;
        return Ok(());
    };
    w.write_u8(ty.tag())?;
    match value {
        Value::Null => {}
        Value::Bool(b) => w.write_u8(u8::from(*b))?,
        Value::Int64(i) => w.write_i64::<BigEndian>(*i)?,
        Value::Float64(f) => w.write_f64::<BigEndian>(*f)?,
        Value::String(s) => write_str(w, s)?,
        Value::Date(_) => {
            let days = value
                .epoch_days()
                .ok_or_else(|| ProtocolError::Malformed("date out of range".to_string()))?;
            w.write_i32::<BigEndian>(days)?;
        }
    }
    Ok(())
}
