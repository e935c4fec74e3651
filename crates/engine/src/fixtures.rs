//! Shared test setup.

use crate::{Context, DEFAULT_TEMPLATE};
use blobrob_azure::MockStore;
use blobrob_storage::backend::MockBackend;
use std::sync::Arc;
use time::Date;
use time::macros::date;

pub(crate) const DAY: Date = date!(2024 - 01 - 01);

pub(crate) fn context(store: MockStore, sink: &Arc<MockBackend>) -> Context {
    let sink: Arc<MockBackend> = Arc::clone(sink);
    Context::new(Arc::new(store), sink, DEFAULT_TEMPLATE.parse().unwrap()).with_date(DAY)
}

/// Where the default template puts a current blob on [`DAY`].
pub(crate) fn target(account: &str, container: &str, name: &str) -> String {
    format!("{DAY}/{account}/{container}/{name}")
}
