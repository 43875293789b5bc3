use uuid::Uuid;

/// Source of unique task identifiers. Shared across concurrent operations.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> anyhow::Result<String>;
}

/// Random (v4) UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> anyhow::Result<String> {
        Ok(Uuid::new_v4().to_string())
    }
}
