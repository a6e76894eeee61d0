/// Search-index side collaborator, told which notebooks need re-indexing after
/// an undo commits. Failures are logged by the caller and never roll back.
pub trait SearchIndexer: Send + Sync {
    fn invalidate_notebooks(&self, notebook_ids: &[String]) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopIndexer;

impl SearchIndexer for NoopIndexer {
    fn invalidate_notebooks(&self, _notebook_ids: &[String]) -> anyhow::Result<()> {
        Ok(())
    }
}
