//! Этапы запуска дубляжа и уведомления о прогрессе
//!
//! Запуск проходит `Init → Transcribing → PartitioningTimeline →
//! RenderingSegments → Assembling → Done`; из любого нетерминального этапа
//! можно перейти в `Failed`.

use std::fmt;
use std::path::PathBuf;

use log::{debug, info, warn};
use tokio::sync::mpsc::Sender;

/// Этап запуска
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Init,
    Transcribing,
    PartitioningTimeline,
    RenderingSegments,
    Assembling,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Следующий этап при успешном завершении текущего
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Init => Some(Self::Transcribing),
            Self::Transcribing => Some(Self::PartitioningTimeline),
            Self::PartitioningTimeline => Some(Self::RenderingSegments),
            Self::RenderingSegments => Some(Self::Assembling),
            Self::Assembling => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }

    pub fn can_enter(&self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == Self::Failed || self.next() == Some(next)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Transcribing => "transcribing",
            Self::PartitioningTimeline => "partitioning timeline",
            Self::RenderingSegments => "rendering segments",
            Self::Assembling => "assembling",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Обновление прогресса для отправки клиенту
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressUpdate {
    /// Запуск перешёл на новый этап
    StageChanged(PipelineStage),
    /// Готов очередной интервал
    IntervalRendered {
        /// Сколько интервалов готово
        completed: usize,
        /// Общее количество интервалов
        total: usize,
    },
    /// Результат записан
    Finished { output: PathBuf },
}

/// Асинхронно отправляет обновление прогресса
pub async fn send_progress(sender: &Option<Sender<ProgressUpdate>>, update: ProgressUpdate) {
    if let Some(sender) = sender {
        let _ = sender.send(update).await;
    }
}

/// Текущий этап запуска с проверкой переходов
#[derive(Debug)]
pub struct StageTracker {
    stage: PipelineStage,
    sender: Option<Sender<ProgressUpdate>>,
}

impl StageTracker {
    pub fn new(sender: Option<Sender<ProgressUpdate>>) -> Self {
        Self {
            stage: PipelineStage::Init,
            sender,
        }
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub fn sender(&self) -> &Option<Sender<ProgressUpdate>> {
        &self.sender
    }

    /// Перейти на этап `next`; недопустимый переход игнорируется с предупреждением
    pub async fn enter(&mut self, next: PipelineStage) -> bool {
        if !self.stage.can_enter(next) {
            warn!("Ignoring stage transition {} -> {}", self.stage, next);
            return false;
        }

        if next == PipelineStage::Failed {
            debug!("Stage {} failed", self.stage);
        } else {
            info!("Stage: {}", next);
        }
        self.stage = next;
        send_progress(&self.sender, ProgressUpdate::StageChanged(next)).await;
        true
    }
}
