//! Visões derivadas do histórico
//!
//! Projeções puras, recalculadas a partir do instantâneo atual. Nenhuma
//! função aqui altera os registros recebidos.

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::AnalysisEntry;

/// Quantidade de ocorrências de um rótulo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCount {
    pub label: String,
    pub count: usize,
}

/// Totais de um dia do calendário (UTC)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub analyses: usize,
    pub detections: usize,
}

/// Totais por paciente
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientSummary {
    pub patient_id: Uuid,
    pub name: String,
    pub analyses: usize,
    pub detections: usize,
}

/// Comparação entre a janela atual e a anterior de mesmo tamanho
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub current: usize,
    pub previous: usize,
    /// Variação percentual; ausente quando a janela anterior está vazia
    pub change_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryOverview {
    pub total_analyses: usize,
    pub total_detections: usize,
    pub patients: usize,
    pub analyses_with_detections: usize,
    pub last_analysis_at: Option<i64>,
    pub trend: Trend,
}

/// Análises de um paciente, na ordem do histórico
pub fn for_patient(entries: &[AnalysisEntry], patient_id: Uuid) -> Vec<&AnalysisEntry> {
    entries
        .iter()
        .filter(|e| e.patient_id == Some(patient_id))
        .collect()
}

/// Análises com timestamp dentro de `[from, to]` (milissegundos, inclusivo)
pub fn in_date_range(entries: &[AnalysisEntry], from: Option<i64>, to: Option<i64>) -> Vec<&AnalysisEntry> {
    entries
        .iter()
        .filter(|e| from.map_or(true, |from| e.timestamp >= from))
        .filter(|e| to.map_or(true, |to| e.timestamp <= to))
        .collect()
}

fn rank_counts(counts: HashMap<String, usize>) -> Vec<LabelCount> {
    let mut ranked: Vec<LabelCount> = counts
        .into_iter()
        .map(|(label, count)| LabelCount { label, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    ranked
}

/// Frequência de cada rótulo exato
pub fn label_frequencies(entries: &[AnalysisEntry]) -> Vec<LabelCount> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for detection in entries.iter().flat_map(|e| &e.detections) {
        *counts.entry(detection.label.clone()).or_default() += 1;
    }
    rank_counts(counts)
}

/// Frequência por classe, ignorando a confiança embutida no rótulo
pub fn class_frequencies(entries: &[AnalysisEntry]) -> Vec<LabelCount> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for detection in entries.iter().flat_map(|e| &e.detections) {
        *counts.entry(detection.class_name().to_string()).or_default() += 1;
    }
    rank_counts(counts)
}

fn entry_date(entry: &AnalysisEntry) -> Option<NaiveDate> {
    DateTime::<Utc>::from_timestamp_millis(entry.timestamp).map(|dt| dt.date_naive())
}

/// Maior série diária produzida; janelas maiores ficam com os dias mais recentes
pub const MAX_SERIES_DAYS: u32 = 3_660;

/// Primeiro dia da janela de `days` dias terminando em `today`, limitado
/// ao menor dia representável
fn window_start(today: NaiveDate, days: u32) -> NaiveDate {
    let span = i64::from(days.max(1)) - 1;
    today.checked_sub_signed(Duration::days(span)).unwrap_or(NaiveDate::MIN)
}

/// Série diária dos últimos `days` dias terminando em `today`, do mais
/// antigo para o mais novo, com zeros nos dias sem análise.
/// Limitada a [`MAX_SERIES_DAYS`] dias.
pub fn daily_counts(entries: &[AnalysisEntry], today: NaiveDate, days: u32) -> Vec<DailyCount> {
    if days == 0 {
        return Vec::new();
    }
    let start = window_start(today, days.min(MAX_SERIES_DAYS));

    let mut series: Vec<DailyCount> = start
        .iter_days()
        .take_while(|date| *date <= today)
        .map(|date| DailyCount { date, analyses: 0, detections: 0 })
        .collect();

    for entry in entries {
        let Some(date) = entry_date(entry) else { continue };
        if date < start || date > today {
            continue;
        }
        let bucket = &mut series[(date - start).num_days() as usize];
        bucket.analyses += 1;
        bucket.detections += entry.detections.len();
    }

    series
}

/// Totais por paciente, ordenados por análises e depois detecções
/// (decrescente). Empates completos mantêm a ordem de aparição.
/// Registros sem paciente ou sem nome ficam de fora.
pub fn patient_summaries(entries: &[AnalysisEntry]) -> Vec<PatientSummary> {
    let mut summaries: Vec<PatientSummary> = Vec::new();
    let mut index: HashMap<Uuid, usize> = HashMap::new();

    for entry in entries {
        let (Some(patient_id), Some(name)) = (entry.patient_id, entry.patient_name.as_ref()) else {
            continue;
        };
        let position = *index.entry(patient_id).or_insert_with(|| {
            summaries.push(PatientSummary {
                patient_id,
                name: name.clone(),
                analyses: 0,
                detections: 0,
            });
            summaries.len() - 1
        });
        let summary = &mut summaries[position];
        summary.analyses += 1;
        summary.detections += entry.detections.len();
    }

    summaries.sort_by(|a, b| {
        b.analyses
            .cmp(&a.analyses)
            .then_with(|| b.detections.cmp(&a.detections))
    });
    summaries
}

fn count_between(entries: &[AnalysisEntry], start: NaiveDate, end: NaiveDate) -> usize {
    entries
        .iter()
        .filter_map(entry_date)
        .filter(|date| *date >= start && *date <= end)
        .count()
}

/// Números gerais do histórico e tendência da janela de `days` dias
pub fn overview(entries: &[AnalysisEntry], today: NaiveDate, days: u32) -> HistoryOverview {
    let current_start = window_start(today, days);
    let current = count_between(entries, current_start, today);
    // janela anterior fora do calendário conta como vazia
    let previous = current_start
        .pred_opt()
        .map(|previous_end| count_between(entries, window_start(previous_end, days), previous_end))
        .unwrap_or(0);
    let change_percent = if previous == 0 {
        None
    } else {
        Some((current as f64 - previous as f64) / previous as f64 * 100.0)
    };

    let mut patients: Vec<Uuid> = entries.iter().filter_map(|e| e.patient_id).collect();
    patients.sort();
    patients.dedup();

    HistoryOverview {
        total_analyses: entries.len(),
        total_detections: entries.iter().map(|e| e.detections.len()).sum(),
        patients: patients.len(),
        analyses_with_detections: entries.iter().filter(|e| !e.detections.is_empty()).count(),
        last_analysis_at: entries.iter().map(|e| e.timestamp).max(),
        trend: Trend { current, previous, change_percent },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DetectionBox, NewAnalysisEntry};
    use chrono::TimeZone;

    fn boxes(labels: &[&str]) -> Vec<DetectionBox> {
        labels
            .iter()
            .map(|label| DetectionBox { x1: 0.0, y1: 0.0, x2: 5.0, y2: 5.0, label: label.to_string() })
            .collect()
    }

    fn entry(patient: Option<(Uuid, &str)>, labels: &[&str], timestamp: i64) -> AnalysisEntry {
        AnalysisEntry::from_new(
            Uuid::new_v4(),
            timestamp,
            NewAnalysisEntry {
                image_url: "blob:x".to_string(),
                file_name: "x.png".to_string(),
                detections: boxes(labels),
                patient_id: patient.map(|(id, _)| id),
                patient_name: patient.map(|(_, name)| name.to_string()),
                ..Default::default()
            },
        )
    }

    fn millis(y: i32, m: u32, d: u32, h: u32) -> i64 {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap().timestamp_millis()
    }

    #[test]
    fn test_for_patient_preserves_order() {
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();
        let entries = vec![
            entry(Some((p1, "Ana")), &[], 3),
            entry(Some((p2, "Bia")), &[], 2),
            entry(Some((p1, "Ana")), &[], 1),
            entry(None, &[], 0),
        ];

        let selected = for_patient(&entries, p1);
        assert_eq!(selected.len(), 2);
        assert!(selected.iter().all(|e| e.patient_id == Some(p1)));
        assert_eq!(selected[0].id, entries[0].id);
        assert_eq!(selected[1].id, entries[2].id);
    }

    #[test]
    fn test_in_date_range_is_inclusive() {
        let entries = vec![entry(None, &[], 300), entry(None, &[], 200), entry(None, &[], 100)];
        let selected = in_date_range(&entries, Some(100), Some(200));
        assert_eq!(selected.len(), 2);
        assert_eq!(in_date_range(&entries, None, None).len(), 3);
        assert_eq!(in_date_range(&entries, Some(301), None).len(), 0);
    }

    #[test]
    fn test_label_and_class_frequencies() {
        let entries = vec![
            entry(None, &["glioma 90%", "meningioma 70%"], 2),
            entry(None, &["glioma 90%", "glioma 60%"], 1),
        ];

        let labels = label_frequencies(&entries);
        assert_eq!(labels[0], LabelCount { label: "glioma 90%".to_string(), count: 2 });
        assert_eq!(labels.len(), 3);

        let classes = class_frequencies(&entries);
        assert_eq!(
            classes,
            vec![
                LabelCount { label: "glioma".to_string(), count: 3 },
                LabelCount { label: "meningioma".to_string(), count: 1 },
            ]
        );
    }

    #[test]
    fn test_daily_counts_window() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let entries = vec![
            entry(None, &["a", "b"], millis(2024, 3, 10, 9)),
            entry(None, &["a"], millis(2024, 3, 10, 8)),
            entry(None, &[], millis(2024, 3, 8, 23)),
            entry(None, &["a"], millis(2024, 3, 1, 12)),
        ];

        let series = daily_counts(&entries, today, 7);
        assert_eq!(series.len(), 7);
        assert_eq!(series[0].date, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        assert_eq!(series[6], DailyCount { date: today, analyses: 2, detections: 3 });
        assert_eq!(series[4].analyses, 1);
        assert_eq!(series.iter().map(|d| d.analyses).sum::<usize>(), 3);
        assert!(daily_counts(&entries, today, 0).is_empty());
    }

    #[test]
    fn test_huge_windows_are_bounded() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let entries = vec![
            entry(None, &["a"], millis(2024, 3, 10, 9)),
            entry(None, &[], millis(1990, 6, 1, 9)),
        ];

        let series = daily_counts(&entries, today, u32::MAX);
        assert_eq!(series.len(), MAX_SERIES_DAYS as usize);
        assert_eq!(series.last().unwrap(), &DailyCount { date: today, analyses: 1, detections: 1 });

        let summary = overview(&entries, today, u32::MAX);
        assert_eq!(summary.trend, Trend { current: 2, previous: 0, change_percent: None });
        assert!(daily_counts(&[], today, u32::MAX).iter().all(|d| d.analyses == 0));
        assert_eq!(overview(&[], today, u32::MAX).trend.current, 0);
    }

    #[test]
    fn test_window_near_calendar_start() {
        let first = NaiveDate::MIN + Duration::days(2);
        let series = daily_counts(&[], first, 10);
        assert_eq!(series.len(), 3);
        assert_eq!(series[0].date, NaiveDate::MIN);
    }

    #[test]
    fn test_patient_summaries_ordering() {
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();
        let entries = vec![
            entry(Some((p1, "P1")), &["a", "b"], 3),
            entry(Some((p1, "P1")), &["a"], 2),
            entry(Some((p2, "P2")), &["a", "b", "c"], 1),
        ];

        let summaries = patient_summaries(&entries);
        assert_eq!(
            summaries,
            vec![
                PatientSummary { patient_id: p1, name: "P1".to_string(), analyses: 2, detections: 3 },
                PatientSummary { patient_id: p2, name: "P2".to_string(), analyses: 1, detections: 3 },
            ]
        );
    }

    #[test]
    fn test_patient_summaries_tie_break_on_detections() {
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();
        let p3 = Uuid::new_v4();
        let entries = vec![
            entry(Some((p1, "P1")), &["a"], 4),
            entry(Some((p2, "P2")), &["a", "b", "c"], 3),
            entry(Some((p3, "P3")), &["a"], 2),
            entry(None, &["a", "b", "c", "d"], 1),
        ];

        let order: Vec<Uuid> = patient_summaries(&entries).iter().map(|s| s.patient_id).collect();
        assert_eq!(order, vec![p2, p1, p3]);
    }

    #[test]
    fn test_views_do_not_mutate_entries() {
        let p1 = Uuid::new_v4();
        let entries = vec![entry(Some((p1, "P1")), &["a"], 1)];
        let before = entries.clone();

        let _ = patient_summaries(&entries);
        let _ = label_frequencies(&entries);
        let _ = daily_counts(&entries, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 30);

        assert_eq!(entries, before);
    }

    #[test]
    fn test_overview_trend() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let p1 = Uuid::new_v4();
        let entries = vec![
            entry(Some((p1, "P1")), &["a"], millis(2024, 3, 9, 10)),
            entry(Some((p1, "P1")), &[], millis(2024, 3, 8, 10)),
            entry(None, &["a", "b"], millis(2024, 3, 1, 10)),
        ];

        let summary = overview(&entries, today, 7);
        assert_eq!(summary.total_analyses, 3);
        assert_eq!(summary.total_detections, 3);
        assert_eq!(summary.patients, 1);
        assert_eq!(summary.analyses_with_detections, 2);
        assert_eq!(summary.last_analysis_at, Some(millis(2024, 3, 9, 10)));
        assert_eq!(summary.trend, Trend { current: 2, previous: 1, change_percent: Some(100.0) });
    }
}
