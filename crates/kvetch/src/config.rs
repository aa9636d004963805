use std::path::{Path, PathBuf};

use kvetch_schema::{Schema, SchemaDefinition};
use serde::{Deserialize, Serialize};

use crate::error::{KvetchError, KvetchResult};

/// Deployment description: which shards exist and what they store.
///
/// ```toml
/// placement = "modulo"
/// id_generator = "random"
///
/// [[shards]]
/// kind = "sqlite"
/// path = "data/shard0.db"
/// pool_size = 4
///
/// [[shards]]
/// kind = "memory"
///
/// [schema]
/// objects = [{ type_name = "Todo", type_id = 1000 }]
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KvetchConfig {
    #[serde(default)]
    pub placement: PlacementKind,
    #[serde(default)]
    pub id_generator: IdGeneratorKind,
    #[serde(default = "default_shards")]
    pub shards: Vec<ShardConfig>,
    #[serde(default)]
    pub schema: SchemaDefinition,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", deny_unknown_fields)]
pub enum ShardConfig {
    Memory,
    Sqlite {
        path: PathBuf,
        #[serde(default = "default_pool_size")]
        pool_size: usize,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementKind {
    #[default]
    Modulo,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdGeneratorKind {
    #[default]
    Random,
    TimeOrdered,
}

fn default_shards() -> Vec<ShardConfig> {
    vec![ShardConfig::Memory]
}

fn default_pool_size() -> usize {
    4
}

impl Default for KvetchConfig {
    fn default() -> Self {
        Self {
            placement: PlacementKind::default(),
            id_generator: IdGeneratorKind::default(),
            shards: default_shards(),
            schema: SchemaDefinition::default(),
        }
    }
}

impl KvetchConfig {
    pub fn from_toml_str(text: &str) -> KvetchResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| KvetchError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file. Relative shard paths resolve against the file's
    /// directory.
    pub fn load(path: impl AsRef<Path>) -> KvetchResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| KvetchError::Config(format!("{}: {e}", path.display())))?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    pub fn to_toml_string(&self) -> KvetchResult<String> {
        toml::to_string_pretty(self).map_err(|e| KvetchError::Config(e.to_string()))
    }

    /// Validated schema.
    pub fn schema(&self) -> KvetchResult<Schema> {
        Ok(Schema::try_from(self.schema.clone())?)
    }

    fn validate(&self) -> KvetchResult<()> {
        if self.shards.is_empty() {
            return Err(KvetchError::Config("at least one shard is required".into()));
        }
        self.schema()?;
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        for shard in &mut self.shards {
            if let ShardConfig::Sqlite { path, .. } = shard {
                if path.is_relative() {
                    *path = base.join(&*path);
                }
            }
        }
    }
}
