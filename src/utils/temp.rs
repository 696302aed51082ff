//! Модуль для работы с рабочей директорией запуска
//!
//! Все промежуточные файлы одного запуска лежат в одной временной директории,
//! которая удаляется рекурсивно при завершении (успех, ошибка, отмена).

use std::path::{Path, PathBuf};

use log::{debug, warn};
use tempfile::TempDir;

use crate::error::Result;
use crate::timeline::IntervalKind;

/// Рабочая директория одного запуска дубляжа
#[derive(Debug)]
pub struct WorkingDirectory {
    /// Временная директория; `None` после явного закрытия
    temp_dir: Option<TempDir>,
    path: PathBuf,
}

impl WorkingDirectory {
    /// Создать рабочую директорию в `root` или в системной временной директории
    pub fn create(root: Option<&Path>) -> Result<Self> {
        let builder = {
            let mut b = tempfile::Builder::new();
            b.prefix("mediadubs-");
            b
        };
        let temp_dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        let path = temp_dir.path().to_path_buf();
        debug!("Created working directory {}", path.display());

        Ok(Self {
            temp_dir: Some(temp_dir),
            path,
        })
    }

    /// Получить путь к рабочей директории
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Личная поддиректория интервала; имена разделены по индексу, блокировки не нужны
    pub fn interval_dir(&self, index: usize, kind: IntervalKind) -> Result<PathBuf> {
        let dir = self.path.join(format!("{:05}_{}", index, kind));
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Путь к файлу в корне рабочей директории
    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Удалить директорию, сообщив об ошибке удаления
    pub fn close(mut self) -> Result<()> {
        if let Some(temp_dir) = self.temp_dir.take() {
            debug!("Removing working directory {}", self.path.display());
            temp_dir.close()?;
        }
        Ok(())
    }
}

impl Drop for WorkingDirectory {
    fn drop(&mut self) {
        if let Some(temp_dir) = self.temp_dir.take() {
            if let Err(e) = temp_dir.close() {
                warn!(
                    "Failed to remove working directory {}: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}
