use crate::engine::data::{FieldType, RecordDescriptor};

/// Defaults to `(int32 key, int64 value)`.
pub struct RecordFactory {
    fields: Vec<FieldType>,
}

impl RecordFactory {
    pub fn new() -> Self {
        Self {
            fields: vec![FieldType::Int32, FieldType::Int64],
        }
    }

    pub fn with_fields(mut self, fields: Vec<FieldType>) -> Self {
        self.fields = fields;
        self
    }

    pub fn create(self) -> RecordDescriptor {
        RecordDescriptor::new(self.fields).expect("record descriptor builds")
    }
}
