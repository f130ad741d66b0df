// Gateway file to expose integration tests from the integration/ subdirectory

mod common;

#[path = "integration/test_retrieval_pipeline.rs"]
mod test_retrieval_pipeline;

#[path = "integration/test_corruption_recovery.rs"]
mod test_corruption_recovery;

#[path = "integration/test_concurrent_access.rs"]
mod test_concurrent_access;

#[path = "integration/test_tenant_lifecycle.rs"]
mod test_tenant_lifecycle;

#[path = "integration/test_config_loading.rs"]
mod test_config_loading;
