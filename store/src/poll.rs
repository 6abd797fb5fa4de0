use std::pin::Pin;
use std::task::{Context, Poll, Waker};

use crate::error::StoreError;
use crate::provider::StoreFuture;

/// Polls a store future once, expecting it to be immediately ready.
///
/// For synchronous callers, such as a command-line tool reading one file,
/// with stores whose futures complete on the first poll:
/// [`FileSystemStore`](crate::FileSystemStore) and
/// [`MemoryStore`](crate::MemoryStore). Returns [`StoreError::WouldBlock`] if the future is pending.
pub fn poll_now<T>(mut fut: StoreFuture<T>) -> Result<T, StoreError> {
    let mut cx = Context::from_waker(Waker::noop());
    match Pin::new(&mut fut).poll(&mut cx) {
        Poll::Ready(val) => val,
        Poll::Pending => Err(StoreError::WouldBlock),
    }
}
