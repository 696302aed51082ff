use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Deserialize;
use tokio::sync::OnceCell;

use crate::error::{DubError, Result};
use crate::utils::command::run_command;

/// Перевод текста между двумя языками
#[async_trait]
pub trait Translator: Send + Sync {
    /// Проверить, что путь перевода `from -> to` существует
    async fn check_pair(&self, from: &str, to: &str) -> Result<()>;

    async fn translate(&self, text: &str, from: &str, to: &str) -> Result<String>;
}

/// Установленные языковые пары
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LanguagePairs {
    pairs: HashSet<(String, String)>,
}

impl LanguagePairs {
    pub fn new<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        Self {
            pairs: pairs.into_iter().map(|(a, b)| (a.into(), b.into())).collect(),
        }
    }

    /// Перевод возможен напрямую или через один промежуточный язык
    pub fn supports(&self, from: &str, to: &str) -> bool {
        if from == to {
            return true;
        }
        if self.pairs.contains(&(from.to_string(), to.to_string())) {
            return true;
        }
        self.pairs
            .iter()
            .filter(|(a, _)| a == from)
            .any(|(_, pivot)| self.pairs.contains(&(pivot.clone(), to.to_string())))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct PackageMetadata {
    from_code: String,
    to_code: String,
}

/// Argos Translate: installed packages plus the `argos-translate` CLI
#[derive(Debug)]
pub struct ArgosTranslator {
    program: PathBuf,
    packages_dir: PathBuf,
    installed: OnceCell<LanguagePairs>,
}

impl ArgosTranslator {
    pub fn new(program: PathBuf, packages_dir: PathBuf) -> Self {
        Self {
            program,
            packages_dir,
            installed: OnceCell::new(),
        }
    }

    /// Директория пакетов по умолчанию: `ARGOS_PACKAGES_DIR` или data dir пользователя
    pub fn default_packages_dir() -> Result<PathBuf> {
        if let Some(dir) = std::env::var_os("ARGOS_PACKAGES_DIR") {
            return Ok(PathBuf::from(dir));
        }
        dirs::data_dir()
            .map(|d| d.join("argos-translate").join("packages"))
            .ok_or_else(|| {
                DubError::Configuration("cannot determine the user data directory".to_string())
            })
    }

    async fn installed_pairs(&self) -> Result<&LanguagePairs> {
        self.installed
            .get_or_try_init(|| async {
                let pairs = scan_packages(&self.packages_dir).await?;
                if pairs.is_empty() {
                    warn!(
                        "No translation packages installed in {}",
                        self.packages_dir.display()
                    );
                    return Ok(pairs);
                }
                info!(
                    "Found {} installed translation packages in {}",
                    pairs.len(),
                    self.packages_dir.display()
                );
                Ok(pairs)
            })
            .await
    }
}

#[async_trait]
impl Translator for ArgosTranslator {
    async fn check_pair(&self, from: &str, to: &str) -> Result<()> {
        if self.installed_pairs().await?.supports(from, to) {
            Ok(())
        } else {
            Err(DubError::TranslationUnavailable {
                from: from.to_string(),
                to: to.to_string(),
            })
        }
    }

    async fn translate(&self, text: &str, from: &str, to: &str) -> Result<String> {
        self.check_pair(from, to).await?;
        if from == to {
            return Ok(text.to_string());
        }

        let args = ["--from-lang", from, "--to-lang", to];
        let output = run_command(&self.program, args, Some(text.as_bytes()))
            .await
            .map_err(|e| DubError::Translation(e.to_string()))?;

        let translated = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if translated.is_empty() {
            return Err(DubError::Translation(format!(
                "empty translation for {:?}",
                text
            )));
        }
        debug!("Translated {:?} -> {:?}", text, translated);
        Ok(translated)
    }
}

/// Прочитать `metadata.json` всех установленных пакетов
pub async fn scan_packages(dir: &Path) -> Result<LanguagePairs> {
    let mut pairs = Vec::new();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Argos packages directory {} does not exist", dir.display());
            return Ok(LanguagePairs::default());
        }
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let metadata_path = entry.path().join("metadata.json");
        let content = match tokio::fs::read_to_string(&metadata_path).await {
            Ok(content) => content,
            Err(_) => continue,
        };
        match serde_json::from_str::<PackageMetadata>(&content) {
            Ok(meta) => pairs.push((meta.from_code, meta.to_code)),
            Err(e) => warn!("Skipping {}: {}", metadata_path.display(), e),
        }
    }

    Ok(LanguagePairs::new(pairs))
}
