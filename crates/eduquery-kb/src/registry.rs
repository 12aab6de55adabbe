//! Subject discovery and dispatch to the builder and retriever.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use eduquery_core::{
    BuildReport, BuildSummary, ChunkingConfig, Embedder, EduQueryConfig, KbError, Result,
    RetrievalConfig, RetrievalResult, SubjectStatus,
};
use eduquery_index::KnowledgeBase;
use eduquery_query::HybridRetriever;

use crate::builder::KnowledgeBaseBuilder;
use crate::files::{contains_file, subdirectories};

/// Maps subject folders under a data root to knowledge bases under an
/// indices root.
///
/// Subject `S` reads documents from `<data_root>/S` and keeps its
/// artifacts in `<indices_root>/S`.
pub struct KnowledgeBaseRegistry<E: ?Sized> {
    data_root: PathBuf,
    indices_root: PathBuf,
    builder: KnowledgeBaseBuilder<E>,
    retriever: HybridRetriever<E>,
    retrieval: RetrievalConfig,
}

impl<E> KnowledgeBaseRegistry<E>
where
    E: Embedder + ?Sized,
{
    /// Create a registry; the embedder is shared by builds and queries.
    pub fn new(
        data_root: impl Into<PathBuf>,
        indices_root: impl Into<PathBuf>,
        embedder: Arc<E>,
        chunking: ChunkingConfig,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            data_root: data_root.into(),
            indices_root: indices_root.into(),
            builder: KnowledgeBaseBuilder::new(Arc::clone(&embedder), chunking),
            retriever: HybridRetriever::new(embedder),
            retrieval,
        }
    }

    /// Create a registry from the application configuration.
    pub fn from_config(config: &EduQueryConfig, embedder: Arc<E>) -> Self {
        let registry = Self::new(
            config.paths.data_root.clone(),
            config.paths.indices_root.clone(),
            embedder,
            config.chunking,
            config.retrieval,
        );
        registry.with_builder(|b| b.with_batch_size(config.embedding.batch_size))
    }

    /// Adjust the builder (batch size, extractors, chunker).
    pub fn with_builder(
        mut self,
        configure: impl FnOnce(KnowledgeBaseBuilder<E>) -> KnowledgeBaseBuilder<E>,
    ) -> Self {
        self.builder = configure(self.builder);
        self
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    pub fn indices_root(&self) -> &Path {
        &self.indices_root
    }

    pub fn retrieval_config(&self) -> RetrievalConfig {
        self.retrieval
    }

    /// Where a subject's artifacts live.
    pub fn index_dir(&self, subject: &str) -> PathBuf {
        self.indices_root.join(subject)
    }

    fn subject_dir(&self, subject: &str) -> PathBuf {
        self.data_root.join(subject)
    }

    /// Subject names are single path components.
    fn check_name(subject: &str) -> Result<()> {
        let mut components = Path::new(subject).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(()),
            _ => Err(KbError::invalid_argument(format!(
                "invalid subject name {:?}",
                subject
            ))),
        }
    }

    /// Subjects in name order: folders under the data root holding at
    /// least one file anywhere below them.
    pub fn list_subjects(&self) -> Vec<String> {
        if !self.data_root.is_dir() {
            warn!("Data root {:?} does not exist", self.data_root);
            return Vec::new();
        }

        subdirectories(&self.data_root)
            .into_iter()
            .filter(|dir| contains_file(dir))
            .filter_map(|dir| dir.file_name()?.to_str().map(str::to_string))
            .collect()
    }

    /// Whether both artifacts exist for a subject.
    pub fn is_built(&self, subject: &str) -> bool {
        Self::check_name(subject).is_ok() && KnowledgeBase::is_complete(&self.index_dir(subject))
    }

    /// Subjects without a complete knowledge base.
    pub fn missing_subjects(&self) -> Vec<String> {
        self.list_subjects()
            .into_iter()
            .filter(|s| !self.is_built(s))
            .collect()
    }

    /// Build state of every subject.
    pub fn status(&self) -> Vec<SubjectStatus> {
        self.list_subjects()
            .into_iter()
            .map(|name| {
                let built = self.is_built(&name);
                let chunks = if built {
                    self.load(&name).ok().map(|kb| kb.len())
                } else {
                    None
                };
                SubjectStatus {
                    name,
                    built,
                    chunks,
                }
            })
            .collect()
    }

    /// Build one subject, fully replacing any previous artifacts.
    pub fn build(&self, subject: &str) -> Result<BuildReport> {
        Self::check_name(subject)?;
        let subject_dir = self.subject_dir(subject);
        if !subject_dir.is_dir() {
            return Err(KbError::SubjectNotFound {
                name: subject.to_string(),
            });
        }
        self.builder
            .build_subject(subject, &subject_dir, &self.index_dir(subject))
    }

    /// Build every subject that is not built yet.
    ///
    /// `progress(subject, fraction)` runs after each subject, successful or
    /// not. One subject failing does not stop the others.
    pub fn build_all(&self, progress: impl FnMut(&str, f32)) -> BuildSummary {
        self.build_each(self.missing_subjects(), progress)
    }

    /// Rebuild every subject, built or not.
    pub fn rebuild_all(&self, progress: impl FnMut(&str, f32)) -> BuildSummary {
        self.build_each(self.list_subjects(), progress)
    }

    fn build_each(&self, subjects: Vec<String>, mut progress: impl FnMut(&str, f32)) -> BuildSummary {
        let total = subjects.len();
        let mut summary = BuildSummary::default();

        info!("Building {} subjects", total);
        for (i, subject) in subjects.iter().enumerate() {
            match self.build(subject) {
                Ok(report) => summary.built.push(report),
                Err(e) => {
                    warn!("Build of '{}' failed: {}", subject, e);
                    summary.failed.push((subject.clone(), e.to_string()));
                }
            }
            progress(subject, (i + 1) as f32 / total as f32);
        }

        info!(
            "Build finished: {} built, {} failed",
            summary.built.len(),
            summary.failed.len()
        );
        summary
    }

    /// Load a subject's knowledge base.
    pub fn load(&self, subject: &str) -> Result<KnowledgeBase> {
        Self::check_name(subject)?;
        KnowledgeBase::open(subject, &self.index_dir(subject))
    }

    /// Retrieve passages for a query using the configured `k` values.
    pub fn retrieve(&self, query: &str, subject: &str) -> Result<Vec<RetrievalResult>> {
        self.retrieve_with(query, subject, &self.retrieval)
    }

    /// Retrieve passages with explicit `k` values.
    ///
    /// The query is lower-cased first. An unbuilt subject is
    /// `IndexNotFound`, never an empty result.
    pub fn retrieve_with(
        &self,
        query: &str,
        subject: &str,
        config: &RetrievalConfig,
    ) -> Result<Vec<RetrievalResult>> {
        let kb = self.load(subject)?;
        self.retriever.retrieve(&query.to_lowercase(), &kb, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use eduquery_embed::HashEmbedder;
    use tempfile::TempDir;

    fn registry(root: &Path) -> KnowledgeBaseRegistry<HashEmbedder> {
        KnowledgeBaseRegistry::new(
            root.join("data"),
            root.join("indices"),
            Arc::new(HashEmbedder::new()),
            ChunkingConfig::default(),
            RetrievalConfig::default(),
        )
    }

    fn write(root: &Path, rel: &str, text: &str) {
        let path = root.join("data").join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    #[test]
    fn test_math_scenario() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "Math/a.txt",
            "Calculus is the study of change. Derivatives measure rate of change.",
        );
        write(tmp.path(), "Math/b.txt", "Algebra deals with symbols and rules.");
        let registry = registry(tmp.path());

        registry.build("Math").unwrap();
        assert_eq!(registry.indices_root(), tmp.path().join("indices"));
        assert!(KnowledgeBase::is_complete(&registry.indices_root().join("Math")));
        let kb = registry.load("Math").unwrap();
        assert_eq!(kb.len(), 2);
        assert_eq!(kb.chunks().sources.len(), 2);
        assert_eq!(kb.vectors().len(), 2);

        let top = registry
            .retrieve_with(
                "What is calculus?",
                "Math",
                &RetrievalConfig {
                    k_initial: 5,
                    k_final: 1,
                },
            )
            .unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].source, "a.txt");

        let both = registry.retrieve("What is calculus?", "Math").unwrap();
        assert_eq!(both.len(), 2);
        assert!(both[0].score > both[1].score);
    }

    #[test]
    fn test_empty_subject_stays_unbuilt() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "Empty/blank.txt", "");
        let registry = registry(tmp.path());

        assert_eq!(registry.list_subjects(), vec!["Empty"]);
        let err = registry.build("Empty").unwrap_err();
        assert_eq!(err.error_code(), "EMPTY_CORPUS");
        assert!(!registry.is_built("Empty"));
    }

    #[test]
    fn test_list_subjects_skips_folders_without_files() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "Physics/week1/notes.txt", "Force equals mass times acceleration.");
        write(tmp.path(), "Biology/cells.txt", "Cells are the unit of life.");
        fs::create_dir_all(tmp.path().join("data/Chemistry/empty")).unwrap();
        fs::write(tmp.path().join("data/stray.txt"), "not a subject").unwrap();

        assert_eq!(registry(tmp.path()).list_subjects(), vec!["Biology", "Physics"]);
    }

    #[test]
    fn test_missing_data_root_lists_nothing() {
        let tmp = TempDir::new().unwrap();
        assert!(registry(tmp.path()).list_subjects().is_empty());
    }

    #[test]
    fn test_retrieve_unbuilt_is_index_not_found() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "Math/a.txt", "Calculus is the study of change.");
        let registry = registry(tmp.path());

        let err = registry.retrieve("calculus", "Math").unwrap_err();
        assert_eq!(err.error_code(), "INDEX_NOT_FOUND");
        let err = registry.retrieve("calculus", "Nowhere").unwrap_err();
        assert_eq!(err.error_code(), "INDEX_NOT_FOUND");
    }

    #[test]
    fn test_build_all_continues_past_failures() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "Art/blank.txt", "");
        write(tmp.path(), "Math/a.txt", "Calculus is the study of change.");
        write(tmp.path(), "Zoology/z.txt", "Zebras have stripes.");
        let registry = registry(tmp.path());

        let mut seen = Vec::new();
        let summary = registry.build_all(|subject, fraction| seen.push((subject.to_string(), fraction)));

        assert!(summary.succeeded());
        assert_eq!(summary.built.len(), 2);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "Art");

        let names: Vec<&str> = seen.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(names, vec!["Art", "Math", "Zoology"]);
        assert!((seen[0].1 - 1.0 / 3.0).abs() < 1e-6);
        assert!((seen[2].1 - 1.0).abs() < 1e-6);

        assert_eq!(registry.missing_subjects(), vec!["Art"]);
    }

    #[test]
    fn test_build_all_skips_built_but_rebuild_all_does_not() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "Math/a.txt", "Calculus is the study of change.");
        let registry = registry(tmp.path());
        registry.build("Math").unwrap();

        assert!(registry.build_all(|_, _| {}).built.is_empty());
        assert_eq!(registry.rebuild_all(|_, _| {}).built.len(), 1);
    }

    #[test]
    fn test_status() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "Math/a.txt", "Calculus is the study of change.");
        write(tmp.path(), "Physics/p.txt", "Force and motion.");
        let registry = registry(tmp.path());
        registry.build("Math").unwrap();

        let status = registry.status();
        assert_eq!(
            status,
            vec![
                SubjectStatus {
                    name: "Math".to_string(),
                    built: true,
                    chunks: Some(1),
                },
                SubjectStatus {
                    name: "Physics".to_string(),
                    built: false,
                    chunks: None,
                },
            ]
        );
    }

    #[test]
    fn test_subject_names_are_checked() {
        let tmp = TempDir::new().unwrap();
        let registry = registry(tmp.path());

        assert_eq!(
            registry.build("../etc").unwrap_err().error_code(),
            "INVALID_ARGUMENT"
        );
        assert_eq!(
            registry.build("Ghost").unwrap_err().error_code(),
            "SUBJECT_NOT_FOUND"
        );
        assert!(!registry.is_built("a/b"));
    }
}
