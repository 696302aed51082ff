//! Оркестрация одного запуска дубляжа
//!
//! Запуск владеет рабочей директорией: она создаётся в начале и удаляется при
//! любом исходе (успех, ошибка, таймаут, отмена). Интервалы рендерятся
//! параллельно в ограниченном пуле задач, а результаты упорядочиваются по
//! временной шкале перед сборкой.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::sync::mpsc::Sender;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::assemble::Assembler;
use crate::config::DubConfig;
use crate::error::{DubError, Result};
use crate::media::MediaToolkit;
use crate::progress::{send_progress, PipelineStage, ProgressUpdate, StageTracker};
use crate::render::{render_interval, RenderContext, RenderedClip};
use crate::services::{Synthesizer, Transcriber, Translator, Voice};
use crate::timeline::{build_timeline, Interval, IntervalKind};
use crate::utils::temp::WorkingDirectory;


/// Внешние исполнители, которыми пользуется конвейер
#[derive(Clone)]
pub struct Collaborators {
    pub transcriber: Arc<dyn Transcriber>,
    pub translator: Arc<dyn Translator>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub media: Arc<dyn MediaToolkit>,
}

/// Параметры одного запуска
#[derive(Debug, Clone)]
pub struct DubRequest {
    pub video: PathBuf,
    pub source_lang: String,
    pub target_lang: String,
    pub voice: Arc<Voice>,
    pub output: PathBuf,
}

pub struct PipelineOrchestrator {
    config: DubConfig,
    services: Collaborators,
    progress: Option<Sender<ProgressUpdate>>,
}

impl PipelineOrchestrator {
    pub fn new(config: DubConfig, services: Collaborators) -> Self {
        Self {
            config,
            services,
            progress: None,
        }
    }

    /// Установить получателя обновлений прогресса
    pub fn with_progress(mut self, sender: Sender<ProgressUpdate>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Выполнить запуск целиком.
    ///
    /// Рабочая директория удаляется до возврата независимо от результата; при
    /// ошибке файл результата не создаётся.
    pub async fn run(&self, request: &DubRequest, cancel: CancellationToken) -> Result<PathBuf> {
        let run_id = uuid::Uuid::new_v4();
        info!(
            "Dub run {}: {} ({} -> {})",
            run_id,
            request.video.display(),
            request.source_lang,
            request.target_lang
        );

        let mut tracker = StageTracker::new(self.progress.clone());
        let work = WorkingDirectory::create(self.config.work_root.as_deref())?;

        let result = self.run_stages(request, &work, &mut tracker, &cancel).await;

        if let Err(e) = work.close() {
            warn!("Dub run {}: failed to clean up working directory: {}", run_id, e);
        }

        match &result {
            Ok(output) => {
                tracker.enter(PipelineStage::Done).await;
                send_progress(
                    tracker.sender(),
                    ProgressUpdate::Finished {
                        output: output.clone(),
                    },
                )
                .await;
                info!("Dub run {} finished: {}", run_id, output.display());
            }
            Err(e) => {
                let failed_in = tracker.stage();
                tracker.enter(PipelineStage::Failed).await;
                if e.is_cancellation() {
                    warn!("Dub run {} cancelled during {}", run_id, failed_in);
                } else {
                    error!("Dub run {} failed during {}: {}", run_id, failed_in, e);
                }
            }
        }

        result
    }

    async fn run_stages(
        &self,
        request: &DubRequest,
        work: &WorkingDirectory,
        tracker: &mut StageTracker,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let media = &self.services.media;

        // до долгого распознавания убеждаемся, что перевод вообще возможен
        self.services
            .translator
            .check_pair(&request.source_lang, &request.target_lang)
            .await?;
        if !request.voice.speaks(&request.target_lang) {
            warn!(
                "Voice language {} does not match target language {}",
                request.voice.language.as_deref().unwrap_or("?"),
                request.target_lang
            );
        }

        tracker.enter(PipelineStage::Transcribing).await;
        let transcript_dir = work.file("transcript");
        tokio::fs::create_dir_all(&transcript_dir).await?;
        let segments = self
            .guarded(
                PipelineStage::Transcribing,
                cancel,
                self.services.transcriber.transcribe(
                    &request.video,
                    &request.source_lang,
                    &transcript_dir,
                ),
            )
            .await?;

        tracker.enter(PipelineStage::PartitioningTimeline).await;
        let video_duration = self
            .guarded(
                PipelineStage::PartitioningTimeline,
                cancel,
                media.probe_duration(&request.video),
            )
            .await?;
        let intervals = build_timeline(segments, video_duration, self.config.overlap_tolerance)?;
        let spoken = intervals
            .iter()
            .filter(|i| i.kind == IntervalKind::Spoken)
            .count();
        info!(
            "Timeline of {:.3}s: {} intervals ({} spoken, {} gaps)",
            video_duration,
            intervals.len(),
            spoken,
            intervals.len() - spoken
        );

        tracker.enter(PipelineStage::RenderingSegments).await;
        let (source_has_audio, frame_rate) = self
            .guarded(PipelineStage::RenderingSegments, cancel, async {
                tokio::try_join!(
                    media.has_audio(&request.video),
                    media.probe_frame_rate(&request.video)
                )
            })
            .await?;
        let context = Arc::new(RenderContext {
            source_video: request.video.clone(),
            source_lang: request.source_lang.clone(),
            target_lang: request.target_lang.clone(),
            voice: Arc::clone(&request.voice),
            translator: Arc::clone(&self.services.translator),
            synthesizer: Arc::clone(&self.services.synthesizer),
            media: Arc::clone(media),
            source_has_audio,
        });
        let clips = self
            .render_all(context, &intervals, work, tracker, cancel)
            .await?;

        tracker.enter(PipelineStage::Assembling).await;
        let assembled = work.file("assembled.mp4");
        let assembler = Assembler::new(Arc::clone(media));
        self.guarded(
            PipelineStage::Assembling,
            cancel,
            assembler.assemble(clips, &assembled, frame_rate),
        )
        .await?;
        publish(&assembled, &request.output).await?;

        Ok(request.output.clone())
    }

    /// Выполнить этап с учётом таймаута и отмены
    async fn guarded<T, F>(&self, stage: PipelineStage, cancel: &CancellationToken, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let limit = self.config.stage_timeout();
        let timed = async {
            match limit {
                Some(limit) => tokio::time::timeout(limit, future)
                    .await
                    .map_err(|_| timeout_error(stage, limit))?,
                None => future.await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DubError::Cancelled),
            result = timed => result,
        }
    }

    /// Отрендерить все интервалы в пуле из `max_concurrent_renders` задач.
    ///
    /// Первая ошибка останавливает остальные задачи и возвращается вызывающему.
    async fn render_all(
        &self,
        context: Arc<RenderContext>,
        intervals: &[Interval],
        work: &WorkingDirectory,
        tracker: &StageTracker,
        cancel: &CancellationToken,
    ) -> Result<Vec<RenderedClip>> {
        let total = intervals.len();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_renders));
        let mut tasks = JoinSet::new();

        for (index, interval) in intervals.iter().enumerate() {
            let scratch = work.interval_dir(index, interval.kind)?;
            let context = Arc::clone(&context);
            let semaphore = Arc::clone(&semaphore);
            let interval = interval.clone();
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| DubError::Cancelled)?;
                render_interval(&context, index, &interval, &scratch).await
            });
        }

        let limit = self.config.stage_timeout();
        let deadline = async {
            match limit {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        let mut clips = Vec::with_capacity(total);
        loop {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.shutdown().await;
                    return Err(DubError::Cancelled);
                }
                _ = &mut deadline => {
                    tasks.shutdown().await;
                    return Err(timeout_error(
                        PipelineStage::RenderingSegments,
                        limit.unwrap_or_default(),
                    ));
                }
                joined = tasks.join_next() => joined,
            };

            let Some(joined) = joined else { break };
            let clip = match joined {
                Ok(Ok(clip)) => clip,
                Ok(Err(e)) => {
                    tasks.shutdown().await;
                    return Err(e);
                }
                Err(e) => {
                    tasks.shutdown().await;
                    return Err(DubError::TaskAborted(e.to_string()));
                }
            };

            clips.push(clip);
            send_progress(
                tracker.sender(),
                ProgressUpdate::IntervalRendered {
                    completed: clips.len(),
                    total,
                },
            )
            .await;
        }

        // порядок завершения произвольный
        clips.sort_by_key(|clip| clip.order);
        Ok(clips)
    }
}

fn timeout_error(stage: PipelineStage, after: Duration) -> DubError {
    DubError::Timeout {
        stage: stage.to_string(),
        after,
    }
}

/// Переместить собранный файл на место результата.
///
/// Если переименование невозможно (другая файловая система), файл
/// копируется; недописанная копия удаляется.
async fn publish(assembled: &Path, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    if tokio::fs::rename(assembled, output).await.is_ok() {
        return Ok(());
    }

    if let Err(e) = tokio::fs::copy(assembled, output).await {
        let _ = tokio::fs::remove_file(output).await;
        return Err(e.into());
    }
    Ok(())
}
