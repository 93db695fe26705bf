use crate::work::disposition::Disposition;
use anyhow::Result;
use core::future::Future;
use core::pin::Pin;
use futures::future;
use tokio_util::sync::CancellationToken;

pub type ExecuteFuture<'a> = Pin<Box<dyn Future<Output = Result<Disposition>> + Send + 'a>>;

/// Trait implemented by caller-supplied per-item logic.
///
/// Exactly one instance is bound to exactly one worker for the worker's entire
/// lifetime; instances are never shared across workers, which is why `execute`
/// may take `&mut self`. Always async so it can perform I/O such as HTTP or DB
/// access.
///
/// The cancellation token is advisory: implementations should observe it to
/// abort promptly, and an abort observed mid-execute is reinterpreted by the
/// worker loop as a retry of the same item rather than data loss. Raised
/// errors never escape the worker loop; they are converted to a
/// [`Disposition`] by the configured exception policy.
pub trait ExecutionUnit<T>: Send + 'static {
    fn execute<'a>(&'a mut self, item: &'a T, cancel: &'a CancellationToken) -> ExecuteFuture<'a>;
}

/// Adapter turning a synchronous closure into an [`ExecutionUnit`].
///
/// Handy for units whose work is CPU-bound or for scripted units in tests.
pub struct FnUnit<F>(F);

impl<F> FnUnit<F> {
    pub fn new(logic: F) -> Self {
        Self(logic)
    }
}

impl<T, F> ExecutionUnit<T> for FnUnit<F>
where
    T: Sync,
    F: FnMut(&T) -> Result<Disposition> + Send + 'static,
{
    fn execute<'a>(&'a mut self, item: &'a T, _cancel: &'a CancellationToken) -> ExecuteFuture<'a> {
        Box::pin(future::ready((self.0)(item)))
    }
}
