//! Разметка временной шкалы видео
//!
//! Превращает упорядоченный список сегментов транскрипта в непрерывную
//! последовательность интервалов `Spoken` / `Gap`, покрывающую `[0, T)`.

use std::fmt;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{DubError, Result};

/// Шаг сетки времени: ffmpeg получает метки с точностью до миллисекунды
const TIME_GRID: f64 = 1000.0;

/// Паузы короче одного кадра (25 fps) не режутся отдельным клипом
pub const MIN_GAP_SECS: f64 = 0.04;

/// Округлить время до миллисекунды
pub fn quantize(seconds: f64) -> f64 {
    (seconds * TIME_GRID).round() / TIME_GRID
}

/// Сегмент распознанной речи
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Начальное время в секундах
    pub start: f64,
    /// Конечное время в секундах
    pub end: f64,
    /// Распознанный текст
    pub text: String,
}

impl TranscriptSegment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

/// Тип интервала
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntervalKind {
    /// Интервал с речью, будет переведён и озвучен
    Spoken,
    /// Интервал без речи, копируется из оригинала
    Gap,
}

impl fmt::Display for IntervalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spoken => f.write_str("spoken"),
            Self::Gap => f.write_str("gap"),
        }
    }
}

/// Один интервал временной шкалы
#[derive(Debug, Clone, PartialEq)]
pub struct Interval {
    pub kind: IntervalKind,
    pub start: f64,
    pub end: f64,
    /// Текст оригинала, есть только у `Spoken`
    pub source_text: Option<String>,
}

impl Interval {
    pub fn spoken(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            kind: IntervalKind::Spoken,
            start,
            end,
            source_text: Some(text.into()),
        }
    }

    pub fn gap(start: f64, end: f64) -> Self {
        Self {
            kind: IntervalKind::Gap,
            start,
            end,
            source_text: None,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Приводит сырые сегменты ASR к виду, пригодному для разметки.
///
/// Границы округляются до миллисекунды. Пустые по тексту сегменты, сегменты
/// за пределами видео и сегменты, схлопнувшиеся при округлении,
/// отбрасываются; конец сегмента обрезается по длительности видео.
pub fn normalize_segments(
    segments: Vec<TranscriptSegment>,
    video_duration: f64,
) -> Vec<TranscriptSegment> {
    let mut normalized = Vec::with_capacity(segments.len());

    for (index, mut segment) in segments.into_iter().enumerate() {
        let text = segment.text.trim();
        if text.is_empty() {
            warn!(
                "Dropping segment {} [{:.3}, {:.3}): no text",
                index, segment.start, segment.end
            );
            continue;
        }
        segment.text = text.to_string();

        let (start, end) = (quantize(segment.start), quantize(segment.end));
        if segment.start < segment.end && end <= start {
            warn!(
                "Dropping segment {} [{:.6}, {:.6}): shorter than a millisecond",
                index, segment.start, segment.end
            );
            continue;
        }
        segment.start = start;
        segment.end = end;

        if segment.start >= video_duration {
            warn!(
                "Dropping segment {} starting at {:.3}s: past the end of the video ({:.3}s)",
                index, segment.start, video_duration
            );
            continue;
        }

        if segment.end > video_duration {
            warn!(
                "Clamping segment {} end from {:.3}s to {:.3}s",
                index, segment.end, video_duration
            );
            segment.end = video_duration;
        }

        normalized.push(segment);
    }

    normalized
}

/// Проверяет порядок сегментов.
///
/// Перекрытие не больше `tolerance` секунд сдвигает начало сегмента на
/// конец предыдущего; большее перекрытие считается ошибкой.
pub fn validate_segments(
    segments: &mut [TranscriptSegment],
    tolerance: f64,
) -> Result<()> {
    let mut previous_end = 0.0_f64;

    for (index, segment) in segments.iter_mut().enumerate() {
        if !segment.start.is_finite() || !segment.end.is_finite() || segment.start < 0.0 {
            return Err(DubError::InvalidSegment {
                index,
                start: segment.start,
                end: segment.end,
            });
        }

        if segment.start < previous_end {
            if previous_end - segment.start > tolerance {
                return Err(DubError::Overlap {
                    index,
                    start: segment.start,
                    previous_end,
                });
            }
            segment.start = previous_end;
        }

        if segment.end <= segment.start {
            return Err(DubError::InvalidSegment {
                index,
                start: segment.start,
                end: segment.end,
            });
        }

        previous_end = segment.end;
    }

    Ok(())
}

/// Разбивает шкалу `[0, video_duration)` на интервалы речи и пауз.
///
/// Пустой список сегментов даёт один `Gap` на всё видео. Интервалы нулевой
/// длины не создаются.
pub fn partition(segments: &[TranscriptSegment], video_duration: f64) -> Vec<Interval> {
    let mut intervals = Vec::with_capacity(segments.len() * 2 + 1);
    let mut last_end = 0.0_f64;

    for segment in segments {
        if segment.start > last_end {
            intervals.push(Interval::gap(last_end, segment.start));
        }
        intervals.push(Interval::spoken(segment.start, segment.end, segment.text.clone()));
        last_end = segment.end;
    }

    if last_end < video_duration {
        intervals.push(Interval::gap(last_end, video_duration));
    }

    intervals
}

/// Слить паузы короче `min_gap` с соседним интервалом.
///
/// Короткая пауза продлевает предыдущий интервал, а в начале шкалы сдвигает
/// начало следующего к нулю. Единственный интервал шкалы остаётся как есть.
pub fn absorb_short_gaps(intervals: Vec<Interval>, min_gap: f64) -> Vec<Interval> {
    let count = intervals.len();
    let mut merged: Vec<Interval> = Vec::with_capacity(count);
    let mut carry_start = None;

    for mut interval in intervals {
        if let Some(start) = carry_start.take() {
            interval.start = start;
        }

        if count > 1 && interval.kind == IntervalKind::Gap && interval.duration() < min_gap {
            debug!(
                "Absorbing {:.3}s gap at {:.3}s into its neighbour",
                interval.duration(),
                interval.start
            );
            match merged.last_mut() {
                Some(previous) => previous.end = interval.end,
                None => carry_start = Some(interval.start),
            }
            continue;
        }

        merged.push(interval);
    }

    merged
}

/// Полный путь от сырых сегментов до интервалов
pub fn build_timeline(
    segments: Vec<TranscriptSegment>,
    video_duration: f64,
    overlap_tolerance: f64,
) -> Result<Vec<Interval>> {
    if !video_duration.is_finite() || video_duration < 0.0 {
        return Err(DubError::InvalidInput(format!(
            "video duration must be a non-negative number, got {}",
            video_duration
        )));
    }

    let video_duration = quantize(video_duration);
    let mut segments = normalize_segments(segments, video_duration);
    validate_segments(&mut segments, overlap_tolerance)?;
    Ok(absorb_short_gaps(
        partition(&segments, video_duration),
        MIN_GAP_SECS,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn assert_covers(intervals: &[Interval], total: f64) {
        if total == 0.0 {
            assert!(intervals.is_empty());
            return;
        }
        assert_eq!(intervals.first().unwrap().start, 0.0);
        assert_eq!(intervals.last().unwrap().end, total);
        for pair in intervals.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        for interval in intervals {
            assert!(interval.start < interval.end);
            match interval.kind {
                IntervalKind::Gap => assert!(interval.source_text.is_none()),
                IntervalKind::Spoken => {
                    assert!(!interval.source_text.as_deref().unwrap_or("").is_empty())
                }
            }
        }
    }

    #[test]
    fn test_partition_interleaves_gaps() {
        let segments = vec![
            TranscriptSegment::new(2.0, 5.0, "hi"),
            TranscriptSegment::new(8.0, 9.0, "bye"),
        ];

        let intervals = partition(&segments, 10.0);

        assert_eq!(
            intervals,
            vec![
                Interval::gap(0.0, 2.0),
                Interval::spoken(2.0, 5.0, "hi"),
                Interval::gap(5.0, 8.0),
                Interval::spoken(8.0, 9.0, "bye"),
                Interval::gap(9.0, 10.0),
            ]
        );
    }

    #[test]
    fn test_partition_without_segments() {
        assert_eq!(partition(&[], 5.0), vec![Interval::gap(0.0, 5.0)]);
        assert!(partition(&[], 0.0).is_empty());
    }

    #[test]
    fn test_partition_skips_zero_length_gaps() {
        let segments = vec![
            TranscriptSegment::new(0.0, 1.5, "one"),
            TranscriptSegment::new(1.5, 3.0, "two"),
        ];

        let intervals = partition(&segments, 3.0);

        assert_eq!(intervals.len(), 2);
        assert!(intervals.iter().all(|i| i.kind == IntervalKind::Spoken));
    }

    #[test]
    fn test_partition_covers_random_timelines() {
        let mut rng = rand::thread_rng();

        for _ in 0..200 {
            let mut cursor = 0.0;
            let mut segments = Vec::new();
            for n in 0..rng.gen_range(0..12) {
                // половина сегментов начинается сразу после предыдущего
                let start = if rng.gen_bool(0.5) {
                    cursor
                } else {
                    cursor + rng.gen_range(0.01..4.0)
                };
                let end = start + rng.gen_range(0.1..6.0);
                segments.push(TranscriptSegment::new(start, end, format!("line {}", n)));
                cursor = end;
            }
            let total = if rng.gen_bool(0.3) {
                cursor
            } else {
                cursor + rng.gen_range(0.01..5.0)
            };

            let intervals = partition(&segments, total);

            assert_covers(&intervals, total);
            let spoken = intervals
                .iter()
                .filter(|i| i.kind == IntervalKind::Spoken)
                .count();
            assert_eq!(spoken, segments.len());
        }
    }

    #[test]
    fn test_normalize_drops_blank_and_clamps() {
        let segments = vec![
            TranscriptSegment::new(0.5, 1.0, "   "),
            TranscriptSegment::new(1.0, 4.0, "  hello "),
            TranscriptSegment::new(4.5, 7.2, "tail"),
            TranscriptSegment::new(7.5, 8.0, "after end"),
        ];

        let normalized = normalize_segments(segments, 7.0);

        assert_eq!(
            normalized,
            vec![
                TranscriptSegment::new(1.0, 4.0, "hello"),
                TranscriptSegment::new(4.5, 7.0, "tail"),
            ]
        );
    }

    #[test]
    fn test_validate_rejects_overlap() {
        let mut segments = vec![
            TranscriptSegment::new(0.0, 3.0, "a"),
            TranscriptSegment::new(2.0, 4.0, "b"),
        ];

        let err = validate_segments(&mut segments, 0.0).unwrap_err();

        assert!(matches!(err, DubError::Overlap { index: 1, .. }));
    }

    #[test]
    fn test_validate_snaps_small_overlap() {
        let mut segments = vec![
            TranscriptSegment::new(0.0, 3.0, "a"),
            TranscriptSegment::new(2.95, 4.0, "b"),
        ];

        validate_segments(&mut segments, 0.1).unwrap();

        assert_eq!(segments[1].start, 3.0);
    }

    #[test]
    fn test_validate_rejects_inverted_segment() {
        let mut segments = vec![TranscriptSegment::new(2.0, 2.0, "empty span")];
        assert!(matches!(
            validate_segments(&mut segments, 0.0),
            Err(DubError::InvalidSegment { index: 0, .. })
        ));

        let mut segments = vec![TranscriptSegment::new(f64::NAN, 2.0, "nan")];
        assert!(validate_segments(&mut segments, 0.0).is_err());
    }

    #[test]
    fn test_duration_noise_at_the_end_does_not_produce_a_gap() {
        let segments = vec![TranscriptSegment::new(2.0, 10.0, "hello")];

        let intervals = build_timeline(segments, 10.000023, 0.0).unwrap();

        assert_eq!(
            intervals,
            vec![Interval::gap(0.0, 2.0), Interval::spoken(2.0, 10.0, "hello")]
        );
        for interval in &intervals {
            assert!(interval.duration() >= 0.001);
            assert_ne!(
                crate::media::ffmpeg::timestamp_arg(interval.duration()).unwrap(),
                "0.000"
            );
        }
    }

    #[test]
    fn test_sub_frame_gaps_are_absorbed() {
        let segments = vec![
            TranscriptSegment::new(0.5, 2.0, "first"),
            TranscriptSegment::new(2.01, 4.0, "second"),
        ];

        let intervals = build_timeline(segments, 4.02, 0.0).unwrap();

        assert_eq!(
            intervals,
            vec![
                Interval::gap(0.0, 0.5),
                Interval::spoken(0.5, 2.01, "first"),
                Interval::spoken(2.01, 4.02, "second"),
            ]
        );
        assert_covers(&intervals, 4.02);
    }

    #[test]
    fn test_short_leading_gap_moves_first_start_to_zero() {
        let segments = vec![TranscriptSegment::new(0.02, 1.0, "hi")];

        let intervals = build_timeline(segments, 1.0, 0.0).unwrap();

        assert_eq!(intervals, vec![Interval::spoken(0.0, 1.0, "hi")]);
    }

    #[test]
    fn test_bounds_are_snapped_to_milliseconds() {
        let segments = vec![
            TranscriptSegment::new(1.0004, 2.0006, "snapped"),
            TranscriptSegment::new(3.0001, 3.0003, "collapsed"),
        ];

        let normalized = normalize_segments(segments, 5.0);

        assert_eq!(normalized, vec![TranscriptSegment::new(1.0, 2.001, "snapped")]);
    }

    #[test]
    fn test_lone_short_timeline_is_kept() {
        let intervals = build_timeline(Vec::new(), 0.02, 0.0).unwrap();
        assert_eq!(intervals, vec![Interval::gap(0.0, 0.02)]);
    }

    #[test]
    fn test_build_timeline_zero_duration_is_empty() {
        let intervals = build_timeline(Vec::new(), 0.0, 0.0).unwrap();
        assert!(intervals.is_empty());
    }
}
