// src/evaluator/parser.rs — Parse judge responses into dimension scores

use std::collections::BTreeMap;

use crate::score::{DimensionId, DimensionScore};

/// Sectioned judge output before conversion into scores.
#[derive(Debug, Default)]
pub struct ParsedJudgement {
    pub percentages: BTreeMap<DimensionId, f64>,
    pub evidence: BTreeMap<DimensionId, Vec<String>>,
    pub gaps: BTreeMap<DimensionId, Vec<String>>,
}

impl ParsedJudgement {
    /// One score per dimension. Dimensions the judge did not score fall to
    /// the lowest non-zero band with an explicit gap.
    pub fn into_scores(mut self) -> BTreeMap<DimensionId, DimensionScore> {
        DimensionId::ALL
            .iter()
            .map(|&d| {
                let evidence = self.evidence.remove(&d).unwrap_or_default();
                let gaps = self.gaps.remove(&d).unwrap_or_default();
                let score = match self.percentages.get(&d) {
                    Some(&pct) => DimensionScore::new(d, pct, evidence, gaps),
                    None => {
                        let mut s = DimensionScore::no_signal(
                            d,
                            format!("Judge returned no score for {}", d.def().name),
                        );
                        s.evidence = evidence;
                        s.gaps.extend(gaps);
                        s
                    }
                };
                (d, score)
            })
            .collect()
    }
}

enum Section {
    None,
    Scores,
    Evidence,
    Gaps,
}

/// Parse a judge response.
///
/// Expected format:
/// ```text
/// SCORES:
/// performance_gains: 85
/// ...
/// EVIDENCE:
/// performance_gains: cites the 33.9% tandem record
/// GAPS:
/// cost_reduction: no capex breakdown
/// ```
pub fn parse_judge_response(response: &str) -> ParsedJudgement {
    let mut parsed = ParsedJudgement::default();
    let mut section = Section::None;

    for line in response.lines() {
        let trimmed = line.trim();
        let header = trimmed
            .trim_start_matches('#')
            .trim()
            .trim_end_matches(':')
            .to_ascii_uppercase();

        // Headers stand alone; "evidence_quality: 80" is a score line.
        match header.as_str() {
            "SCORES" => {
                section = Section::Scores;
                continue;
            }
            "EVIDENCE" => {
                section = Section::Evidence;
                continue;
            }
            "GAPS" => {
                section = Section::Gaps;
                continue;
            }
            _ => {}
        }

        match section {
            Section::Scores => {
                if let Some((dim, pct)) = parse_score_line(trimmed) {
                    parsed.percentages.insert(dim, pct);
                }
            }
            Section::Evidence => {
                if let Some((dim, text)) = parse_note_line(trimmed) {
                    parsed.evidence.entry(dim).or_default().push(text);
                }
            }
            Section::Gaps => {
                if let Some((dim, text)) = parse_note_line(trimmed) {
                    parsed.gaps.entry(dim).or_default().push(text);
                }
            }
            Section::None => {}
        }
    }

    parsed
}

/// Parse "performance_gains: 85", "- cost reduction: 72%", or "evidence_quality: 0.6".
/// A decimal value at or below 1.0 is read as a fraction.
pub(crate) fn parse_score_line(line: &str) -> Option<(DimensionId, f64)> {
    let line = line.trim_start_matches(['-', '*']).trim();
    let (name, value) = line.split_once(':')?;
    let dim = DimensionId::parse(name)?;
    let raw = value.trim().trim_end_matches('%').trim();
    let mut pct: f64 = raw.split_whitespace().next()?.parse().ok()?;
    if raw.contains('.') && pct <= 1.0 {
        pct *= 100.0;
    }
    if !(0.0..=100.0).contains(&pct) {
        return None;
    }
    Some((dim, pct))
}

pub(crate) fn parse_note_line(line: &str) -> Option<(DimensionId, String)> {
    let line = line.trim_start_matches(['-', '*']).trim();
    let (name, text) = line.split_once(':')?;
    let dim = DimensionId::parse(name)?;
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some((dim, text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::dimensions::NO_SIGNAL_PERCENT;

    // ─── parse_score_line ───────────────────────────────────────

    #[test]
    fn test_parse_score_line_variants() {
        assert_eq!(
            parse_score_line("performance_gains: 85"),
            Some((DimensionId::PerformanceGains, 85.0))
        );
        assert_eq!(
            parse_score_line("- Cost Reduction: 72%"),
            Some((DimensionId::CostReduction, 72.0))
        );
        assert_eq!(
            parse_score_line("evidence_quality: 0.6"),
            Some((DimensionId::EvidenceQuality, 60.0))
        );
        assert_eq!(
            parse_score_line("societal_impact: 1"),
            Some((DimensionId::SocietalImpact, 1.0))
        );
    }

    #[test]
    fn test_parse_score_line_rejects_garbage() {
        assert!(parse_score_line("vibes: 90").is_none());
        assert!(parse_score_line("performance_gains: high").is_none());
        assert!(parse_score_line("performance_gains: 140").is_none());
        assert!(parse_score_line("no colon here").is_none());
    }

    // ─── parse_judge_response ───────────────────────────────────

    #[test]
    fn test_full_response() {
        let response = "\
SCORES:
performance_gains: 90
cost_reduction: 75
EVIDENCE:
performance_gains: cites 33.9% tandem record
GAPS:
cost_reduction: no capex breakdown
cost_reduction: ignores balance of system";
        let parsed = parse_judge_response(response);
        assert_eq!(parsed.percentages.len(), 2);
        assert_eq!(
            parsed.evidence[&DimensionId::PerformanceGains],
            vec!["cites 33.9% tandem record".to_string()]
        );
        assert_eq!(parsed.gaps[&DimensionId::CostReduction].len(), 2);
    }

    #[test]
    fn test_markdown_headers() {
        let response = "## Scores\n- problem_solving: 80\n## Gaps\n- problem_solving: vague";
        let parsed = parse_judge_response(response);
        assert_eq!(parsed.percentages[&DimensionId::ProblemSolving], 80.0);
        assert_eq!(parsed.gaps[&DimensionId::ProblemSolving], vec!["vague".to_string()]);
    }

    #[test]
    fn test_missing_dimensions_default_to_lowest_band() {
        let scores = parse_judge_response("SCORES:\nperformance_gains: 95").into_scores();
        assert_eq!(scores.len(), DimensionId::ALL.len());
        assert_eq!(scores[&DimensionId::PerformanceGains].percentage, 95.0);
        let missing = &scores[&DimensionId::CostReduction];
        assert_eq!(missing.percentage, NO_SIGNAL_PERCENT);
        assert!(missing.points > 0.0);
        assert!(missing.gaps[0].contains("Cost Reduction"));
    }

    #[test]
    fn test_evidence_quality_line_is_not_a_header() {
        let parsed = parse_judge_response("SCORES:\nevidence_quality: 80\ncost_reduction: 70");
        assert_eq!(parsed.percentages.len(), 2);
        assert_eq!(parsed.percentages[&DimensionId::EvidenceQuality], 80.0);
    }

    #[test]
    fn test_empty_response_has_no_percentages() {
        assert!(parse_judge_response("I cannot evaluate this.").percentages.is_empty());
    }
}
