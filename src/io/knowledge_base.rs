use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Category, LegacyRecord, StructuredRecord};

use super::traits::{combine_traits, high_performing_traits};

/// Storage collaborator for reference scripts and category traits
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    /// Up to `top_k` reference texts of `category` relevant to `query`.
    /// An empty result is legitimate.
    async fn search(&self, query: &str, category: Category, top_k: usize) -> Result<Vec<String>, StoreError>;

    /// "High-performing traits" reference text for a category
    async fn traits_for(&self, category: Category) -> Result<String, StoreError>;

    /// Category traits plus the theme and gameplay sections, when given
    async fn comprehensive_traits(
        &self,
        category: Category,
        theme: Option<&str>,
        gameplay: Option<&str>,
    ) -> Result<String, StoreError> {
        let traits = self.traits_for(category).await?;
        Ok(combine_traits(&traits, theme, gameplay))
    }

    /// Persist `content` with its record; returns the new identifier
    async fn write(&self, record: &StructuredRecord, content: &str, category: Category) -> Result<String, StoreError>;
}

/// Record metadata as found on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredMetadata {
    Current(StructuredRecord),
    Legacy(LegacyRecord),
}

impl StoredMetadata {
    pub fn into_record(self) -> StructuredRecord {
        match self {
            StoredMetadata::Current(record) => record,
            StoredMetadata::Legacy(legacy) => legacy.into(),
        }
    }
}

/// One stored script file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredScript {
    pub id: String,
    pub content: String,
    pub category: Category,
    pub metadata: StoredMetadata,
}

impl StoredScript {
    pub fn record(&self) -> StructuredRecord {
        self.metadata.clone().into_record()
    }
}

/// Knowledge base keeping one JSON file per script under
/// `<root>/<category>/<id>.json`
#[derive(Debug, Clone)]
pub struct FileKnowledgeBase {
    root: PathBuf,
}

impl FileKnowledgeBase {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn category_dir(&self, category: Category) -> PathBuf {
        self.root.join(category.label())
    }

    /// Load one script by id
    pub async fn get(&self, category: Category, id: &str) -> Result<StoredScript, StoreError> {
        let path = self.category_dir(category).join(format!("{}.json", id));
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// All readable scripts of a category, oldest first.
    /// Files that fail to parse are skipped with a warning.
    pub async fn list(&self, category: Category) -> Result<Vec<StoredScript>, StoreError> {
        let dir = self.category_dir(category);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut scripts = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!("Skipping unreadable script {:?}: {}", path, e);
                    continue;
                }
            };
            match serde_json::from_str::<StoredScript>(&content) {
                Ok(script) => scripts.push(script),
                Err(e) => warn!("Skipping unreadable script {:?}: {}", path, e),
            }
        }

        scripts.sort_by_cached_key(|s| (s.record().recorded_at, s.id.clone()));
        Ok(scripts)
    }

    /// Number of stored scripts, in one category or across all of them
    pub async fn count(&self, category: Option<Category>) -> Result<usize, StoreError> {
        let categories: Vec<Category> = match category {
            Some(category) => vec![category],
            None => Category::ALL.to_vec(),
        };

        let mut total = 0;
        for category in categories {
            total += self.list(category).await?.len();
        }
        Ok(total)
    }
}

#[async_trait]
impl KnowledgeBase for FileKnowledgeBase {
    async fn search(&self, query: &str, category: Category, top_k: usize) -> Result<Vec<String>, StoreError> {
        let scripts = self.list(category).await?;
        let ranked = rank_by_keywords(query, scripts.iter().map(|s| s.content.as_str()), top_k);
        debug!(
            "Keyword search in [{}]: {} of {} scripts matched",
            category,
            ranked.len(),
            scripts.len()
        );
        Ok(ranked.into_iter().map(str::to_string).collect())
    }

    async fn traits_for(&self, category: Category) -> Result<String, StoreError> {
        Ok(high_performing_traits(category).to_string())
    }

    async fn write(&self, record: &StructuredRecord, content: &str, category: Category) -> Result<String, StoreError> {
        let dir = self.category_dir(category);
        tokio::fs::create_dir_all(&dir).await?;

        let script = StoredScript {
            id: Uuid::new_v4().to_string(),
            content: content.to_string(),
            category,
            metadata: StoredMetadata::Current(record.clone()),
        };
        let json = serde_json::to_string_pretty(&script)?;

        write_atomically(&dir.join(format!("{}.json", script.id)), &json).await?;

        info!("Stored script {} under [{}]", script.id, category);
        Ok(script.id)
    }
}

/// Write to `<path>.tmp` and rename, so readers never see a partial file.
/// The temp file is removed if the rename fails.
async fn write_atomically(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, contents).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        tokio::fs::remove_file(&tmp).await.ok();
        return Err(e);
    }
    Ok(())
}

/// Score texts by how many distinct query terms they contain
/// (whitespace-split, case-insensitive). Texts without a hit are dropped;
/// ties keep their input order.
pub fn rank_by_keywords<'a>(query: &str, texts: impl Iterator<Item = &'a str>, top_k: usize) -> Vec<&'a str> {
    let lowered = query.to_lowercase();
    let terms: HashSet<&str> = lowered.split_whitespace().collect();

    let mut scored: Vec<(usize, &str)> = texts
        .filter_map(|text| {
            let haystack = text.to_lowercase();
            let score = terms.iter().filter(|term| haystack.contains(*term)).count();
            (score > 0).then_some((score, text))
        })
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().take(top_k).map(|(_, text)| text).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::traits::DEFAULT_TRAITS;
    use crate::models::parse_timestamp;

    fn record(name: &str, category: Category, at: &str) -> StructuredRecord {
        StructuredRecord {
            subject_name: name.to_string(),
            category,
            recorded_at: parse_timestamp(at).unwrap(),
            ..Default::default()
        }
    }

    #[test]
    fn test_rank_by_keywords() {
        let texts = ["攻城 抽卡 联盟", "抽卡", "捏脸 交易", "联盟 攻城"];
        let ranked = rank_by_keywords("攻城 抽卡 联盟", texts.iter().copied(), 2);
        assert_eq!(ranked, vec!["攻城 抽卡 联盟", "联盟 攻城"]);

        assert!(rank_by_keywords("MMO", texts.iter().copied(), 3).is_empty());
    }

    #[test]
    fn test_rank_is_case_insensitive() {
        let texts = ["Epic BOSS fight"];
        assert_eq!(rank_by_keywords("boss", texts.iter().copied(), 3).len(), 1);
    }

    #[tokio::test]
    async fn test_write_then_search_same_category() {
        let dir = tempfile::tempdir().unwrap();
        let kb = FileKnowledgeBase::new(dir.path());

        let slg = record("万国觉醒", Category::Slg, "2025-01-01T00:00:00Z");
        let id = kb.write(&slg, "开局送十连抽 攻城", Category::Slg).await.unwrap();
        kb.write(&record("其它", Category::Mmo, "2025-01-02T00:00:00Z"), "十连抽", Category::Mmo)
            .await
            .unwrap();

        assert!(dir.path().join("SLG").join(format!("{}.json", id)).exists());

        let hits = kb.search("十连抽", Category::Slg, 3).await.unwrap();
        assert_eq!(hits, vec!["开局送十连抽 攻城"]);

        let stored = kb.get(Category::Slg, &id).await.unwrap();
        assert_eq!(stored.record(), slg);
        assert_eq!(kb.count(None).await.unwrap(), 2);
        assert_eq!(kb.count(Some(Category::Mmo)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_category_is_empty_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let kb = FileKnowledgeBase::new(dir.path().join("nope"));

        assert!(kb.search("x", Category::Card, 3).await.unwrap().is_empty());
        assert_eq!(kb.count(None).await.unwrap(), 0);
        assert!(matches!(
            kb.get(Category::Card, "missing").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reads_legacy_layout() {
        let dir = tempfile::tempdir().unwrap();
        let category_dir = dir.path().join("MMO");
        std::fs::create_dir_all(&category_dir).unwrap();
        std::fs::write(
            category_dir.join("old-1.json"),
            r#"{
                "id": "old-1",
                "content": "装备回收 自由交易",
                "category": "MMO",
                "metadata": {
                    "game_name": "传奇世界",
                    "performance": "高",
                    "source": "manual",
                    "archived_at": "2024-06-01T10:00:00"
                }
            }"#,
        )
        .unwrap();
        std::fs::write(category_dir.join("broken.json"), "{").unwrap();

        let kb = FileKnowledgeBase::new(dir.path());
        let scripts = kb.list(Category::Mmo).await.unwrap();
        assert_eq!(scripts.len(), 1);

        let migrated = scripts[0].record();
        assert_eq!(migrated.subject_name, "传奇世界");
        assert_eq!(migrated.origin, "manual");
        assert_eq!(migrated.category, Category::Other);
        assert!(migrated.tags.is_empty());
        assert_eq!(migrated.recorded_at, parse_timestamp("2024-06-01T10:00:00Z").unwrap());
    }

    #[tokio::test]
    async fn test_io_error_skips_only_that_file() {
        let dir = tempfile::tempdir().unwrap();
        let kb = FileKnowledgeBase::new(dir.path());
        kb.write(&record("万国觉醒", Category::Slg, "2025-01-01T00:00:00Z"), "攻城", Category::Slg)
            .await
            .unwrap();
        // A directory with a .json name fails to read as a file
        std::fs::create_dir_all(dir.path().join("SLG").join("stray.json")).unwrap();

        assert_eq!(kb.list(Category::Slg).await.unwrap().len(), 1);
        assert_eq!(kb.search("攻城", Category::Slg, 3).await.unwrap(), vec!["攻城"]);
    }

    #[tokio::test]
    async fn test_failed_rename_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("taken.json");
        std::fs::create_dir_all(target.join("occupied")).unwrap();

        assert!(write_atomically(&target, "{}").await.is_err());
        assert!(!dir.path().join("taken.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_comprehensive_traits_add_profiles() {
        let kb = FileKnowledgeBase::new("unused");
        let traits = kb
            .comprehensive_traits(Category::Slg, Some("三国"), Some("卡牌"))
            .await
            .unwrap();

        assert!(traits.starts_with(&kb.traits_for(Category::Slg).await.unwrap()));
        assert!(traits.contains("【三国题材特征】"));
        assert!(traits.contains("【卡牌玩法特征】"));
    }

    #[tokio::test]
    async fn test_traits_fall_back_to_generic() {
        let kb = FileKnowledgeBase::new("unused");
        assert_eq!(kb.traits_for(Category::Other).await.unwrap(), DEFAULT_TRAITS);
        assert!(kb.traits_for(Category::Slg).await.unwrap().contains("SLG"));
    }
}
