pub struct ResourceLimits {
    /// Per-stream cap on captured stdout/stderr bytes.
    pub max_output_bytes: usize,
}

pub struct SandboxConfig {
    pub id: uuid::Uuid,
    pub limits: ResourceLimits,
}
