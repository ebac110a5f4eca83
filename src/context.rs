//! Per-request context channel between the upload orchestrator and the
//! storage provider.
//!
//! An [`UploadContext`] is created for one logical write request, filled by
//! the orchestrator with one [`FileContext`] per incoming file in upload
//! order, and handed `&mut` down the call path to the provider. Isolation
//! between concurrent requests falls out of ownership: each request holds its
//! own value, there is no shared queue and no locking. The value is dropped
//! with the request; nothing here is ever persisted.

use std::collections::VecDeque;

/// Precomputed destination for one incoming file.
///
/// Consumed at most once, by the provider that names the object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContext {
    /// Sanitized folder path derived from the owner's lineage.
    pub target_path: String,
    /// Sanitized file name, possibly hash-disambiguated.
    pub base_file_name: String,
}

impl FileContext {
    pub fn new(target_path: impl Into<String>, base_file_name: impl Into<String>) -> Self {
        Self {
            target_path: target_path.into(),
            base_file_name: base_file_name.into(),
        }
    }

    /// Full store key this context names.
    pub fn key(&self) -> String {
        if self.target_path.is_empty() {
            self.base_file_name.clone()
        } else {
            format!("{}/{}", self.target_path, self.base_file_name)
        }
    }
}

/// FIFO queue of [`FileContext`] entries scoped to one request.
#[derive(Debug, Default)]
pub struct UploadContext {
    queue: VecDeque<FileContext>,
}

impl UploadContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue contexts in the exact order the files will be handed to the
    /// storage provider. Called once per request by the orchestrator, before
    /// any file is delegated.
    pub fn establish(&mut self, contexts: impl IntoIterator<Item = FileContext>) {
        self.queue.extend(contexts);
    }

    /// Dequeue the next context, strictly FIFO.
    ///
    /// `None` means more files arrived than contexts were queued (or no
    /// context was established at all); the provider then falls back to its
    /// default naming. That degradation is permitted, not an error.
    pub fn next_context(&mut self) -> Option<FileContext> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(path: &str, name: &str) -> FileContext {
        FileContext::new(path, name)
    }

    #[test]
    fn consumption_is_fifo() {
        let mut scope = UploadContext::new();
        scope.establish([ctx("a/b", "one.pdf"), ctx("a/b", "two.pdf"), ctx("c", "three.png")]);

        assert_eq!(scope.next_context().unwrap().base_file_name, "one.pdf");
        assert_eq!(scope.next_context().unwrap().base_file_name, "two.pdf");
        assert_eq!(scope.next_context().unwrap().base_file_name, "three.png");
        assert!(scope.next_context().is_none());
    }

    #[test]
    fn excess_dequeues_observe_empty() {
        let mut scope = UploadContext::new();
        scope.establish([ctx("a", "only.pdf")]);

        assert!(scope.next_context().is_some());
        assert!(scope.next_context().is_none());
        assert!(scope.next_context().is_none());
    }

    #[tokio::test]
    async fn concurrent_scopes_never_cross() {
        // Two in-flight requests, each with its own scope; interleaved
        // consumption on separate tasks must only ever see its own entries.
        let task_a = tokio::spawn(async {
            let mut scope = UploadContext::new();
            scope.establish([ctx("req-a", "a1.pdf"), ctx("req-a", "a2.pdf")]);
            let mut seen = Vec::new();
            while let Some(fc) = scope.next_context() {
                tokio::task::yield_now().await;
                seen.push(fc.key());
            }
            seen
        });
        let task_b = tokio::spawn(async {
            let mut scope = UploadContext::new();
            scope.establish([ctx("req-b", "b1.pdf")]);
            let mut seen = Vec::new();
            while let Some(fc) = scope.next_context() {
                tokio::task::yield_now().await;
                seen.push(fc.key());
            }
            seen
        });

        let (seen_a, seen_b) = (task_a.await.unwrap(), task_b.await.unwrap());
        assert_eq!(seen_a, vec!["req-a/a1.pdf", "req-a/a2.pdf"]);
        assert_eq!(seen_b, vec!["req-b/b1.pdf"]);
    }

    #[test]
    fn key_joins_path_and_name() {
        assert_eq!(ctx("a/b", "f.txt").key(), "a/b/f.txt");
        assert_eq!(ctx("", "f.txt").key(), "f.txt");
    }
}
