//! Pure portfolio risk analysis over an Aggregator positions snapshot:
//! category classification, pairwise correlation, HHI concentration,
//! category exposure, and hedge-pair detection.

use crate::models::{Category, Position, Side};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `marketQuestion` isn't on `Position` itself, so callers supply it
/// alongside each position (from the `Market` cache) since positions don't
/// carry free text.
pub struct Classified<'a> {
    pub position: &'a Position,
    pub question: &'a str,
    pub category: Category,
}

const CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (Category::Politics, &["election", "president", "senate", "congress", "vote", "governor"]),
    (Category::Crypto, &["bitcoin", "btc", "ethereum", "eth", "crypto", "token", "airdrop"]),
    (Category::Sports, &["game", "match", "championship", "playoff", "league", "tournament"]),
    (Category::Economics, &["inflation", "fed", "rate", "gdp", "recession", "unemployment"]),
    (Category::Entertainment, &["movie", "oscar", "album", "celebrity", "award"]),
    (Category::Weather, &["hurricane", "temperature", "weather", "storm", "rainfall"]),
    (Category::Science, &["nasa", "space", "vaccine", "research", "discovery"]),
];

pub fn classify(question: &str) -> Category {
    let lower = question.to_lowercase();
    for (category, keywords) in CATEGORY_KEYWORDS {
        if keywords.iter().any(|kw| lower.contains(kw)) {
            return *category;
        }
    }
    Category::Other
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorrelationKind {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Correlation {
    pub value: f64,
    pub kind: CorrelationKind,
    pub reason: String,
}

fn extract_entities(question: &str) -> Vec<String> {
    question
        .split(|c: char| !c.is_alphanumeric())
        .filter(|tok| tok.len() > 2)
        .filter(|tok| {
            let first = tok.chars().next().unwrap_or('a');
            first.is_uppercase() || tok.chars().all(|c| c.is_ascii_digit())
        })
        .map(|tok| tok.to_lowercase())
        .collect()
}

pub fn correlation(a: &Classified, b: &Classified) -> Correlation {
    if a.position.market_id == b.position.market_id {
        if a.position.outcome_id != b.position.outcome_id {
            return Correlation {
                value: -1.0,
                kind: CorrelationKind::Negative,
                reason: "same market opposite outcome".into(),
            };
        }
        return Correlation {
            value: 1.0,
            kind: CorrelationKind::Positive,
            reason: "same market same outcome".into(),
        };
    }

    if a.category == b.category && a.category != Category::Other {
        let entities_a = extract_entities(a.question);
        let entities_b = extract_entities(b.question);
        let shared = entities_a.iter().filter(|e| entities_b.contains(e)).count();
        if shared > 0 {
            let value = (0.7 + 0.1 * shared as f64).min(0.95);
            return Correlation {
                value,
                kind: CorrelationKind::Positive,
                reason: format!("same category with {shared} shared entities"),
            };
        }
        return Correlation {
            value: 0.4,
            kind: CorrelationKind::Positive,
            reason: "same category, no shared entities".into(),
        };
    }

    let cross = matches!(
        (a.category, b.category),
        (Category::Politics, Category::Economics) | (Category::Economics, Category::Politics)
    );
    if cross {
        return Correlation {
            value: 0.3,
            kind: CorrelationKind::Positive,
            reason: "politics/economics cross-category".into(),
        };
    }

    Correlation {
        value: 0.1,
        kind: CorrelationKind::Neutral,
        reason: "unrelated markets".into(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub values: Vec<Vec<f64>>,
    pub flagged_pairs: Vec<(usize, usize)>,
    pub portfolio_correlation: f64,
}

pub fn correlation_matrix(positions: &[Classified]) -> CorrelationMatrix {
    let n = positions.len();
    if n == 0 {
        return CorrelationMatrix {
            values: Vec::new(),
            flagged_pairs: Vec::new(),
            portfolio_correlation: 0.0,
        };
    }

    // Compute the upper triangle in parallel; a symmetric matrix only needs
    // i<j evaluated once.
    let pairs: Vec<(usize, usize, f64)> = (0..n)
        .into_par_iter()
        .flat_map(|i| {
            ((i + 1)..n)
                .into_par_iter()
                .map(move |j| (i, j, correlation(&positions[i], &positions[j]).value))
        })
        .collect();

    let mut values = vec![vec![0.0; n]; n];
    for i in 0..n {
        values[i][i] = 1.0;
    }
    let mut flagged_pairs = Vec::new();
    let mut sum_abs = 0.0;
    for (i, j, value) in &pairs {
        values[*i][*j] = *value;
        values[*j][*i] = *value;
        if value.abs() > 0.7 {
            flagged_pairs.push((*i, *j));
        }
        sum_abs += value.abs();
    }

    let portfolio_correlation = if !pairs.is_empty() { sum_abs / pairs.len() as f64 } else { 0.0 };

    CorrelationMatrix {
        values,
        flagged_pairs,
        portfolio_correlation,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concentration {
    pub hhi: f64,
    pub largest_position_pct: f64,
    pub top3_pct: f64,
    pub diversification_score: f64,
    pub risk_level: RiskLevel,
}

pub fn concentration(positions: &[Position]) -> Concentration {
    let total: f64 = positions.iter().map(|p| p.value().abs()).sum();
    if total <= 0.0 {
        return Concentration {
            hhi: 0.0,
            largest_position_pct: 0.0,
            top3_pct: 0.0,
            diversification_score: 100.0,
            risk_level: RiskLevel::Low,
        };
    }

    let mut shares: Vec<f64> = positions.iter().map(|p| p.value().abs() / total * 100.0).collect();
    shares.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

    let hhi: f64 = shares.iter().map(|s| s * s).sum();
    let largest_position_pct = shares.first().copied().unwrap_or(0.0);
    let top3_pct: f64 = shares.iter().take(3).sum();
    let diversification_score = (100.0 - hhi / 100.0).max(0.0);

    let risk_level = if largest_position_pct > 50.0 || hhi > 5000.0 {
        RiskLevel::Critical
    } else if largest_position_pct > 30.0 || hhi > 2500.0 {
        RiskLevel::High
    } else if largest_position_pct > 20.0 || hhi > 1500.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    Concentration {
        hhi,
        largest_position_pct,
        top3_pct,
        diversification_score,
        risk_level,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryExposure {
    pub category: Category,
    pub position_count: u32,
    pub total_value: f64,
    pub value_percent: f64,
}

pub fn category_exposure(classified: &[Classified]) -> Vec<CategoryExposure> {
    let total: f64 = classified.iter().map(|c| c.position.value().abs()).sum();
    let mut by_category: HashMap<Category, (u32, f64)> = HashMap::new();
    for c in classified {
        let entry = by_category.entry(c.category).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += c.position.value().abs();
    }
    let mut out: Vec<CategoryExposure> = by_category
        .into_iter()
        .map(|(category, (count, value))| CategoryExposure {
            category,
            position_count: count,
            total_value: value,
            value_percent: if total > 0.0 { value / total * 100.0 } else { 0.0 },
        })
        .collect();
    out.sort_by(|a, b| b.total_value.partial_cmp(&a.total_value).unwrap_or(std::cmp::Ordering::Equal));
    out
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HedgedPair {
    pub long: Position,
    pub short: Position,
    pub hedge_ratio: f64,
}

/// Within each `(venue, marketId)` group, pairs the YES-outcome position
/// against the NO-outcome position when both are present, identified by
/// `outcome_id` rather than `side`. A trader can hold both outcomes via
/// two `Buy`s, and two `Buy`/`Sell` legs on a perp venue are long/short
/// exposure, not YES/NO, so `side` alone can't tell hedged apart from not.
pub fn find_hedged_pairs(positions: &[Position]) -> Vec<HedgedPair> {
    let mut groups: HashMap<(crate::models::Venue, String), Vec<&Position>> = HashMap::new();
    for p in positions {
        groups.entry((p.venue, p.market_id.clone())).or_default().push(p);
    }

    let mut pairs = Vec::new();
    for group in groups.values() {
        let yes = group.iter().find(|p| p.outcome_id.eq_ignore_ascii_case("yes"));
        let no = group.iter().find(|p| p.outcome_id.eq_ignore_ascii_case("no"));
        if let (Some(yes), Some(no)) = (yes, no) {
            let yes_abs = yes.value().abs();
            let no_abs = no.value().abs();
            if yes_abs > 0.0 && no_abs > 0.0 {
                let hedge_ratio = yes_abs.min(no_abs) / yes_abs.max(no_abs);
                pairs.push(HedgedPair {
                    long: (*yes).clone(),
                    short: (*no).clone(),
                    hedge_ratio,
                });
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Venue;
    use chrono::Utc;

    fn pos(market: &str, outcome: &str, side: Side, value: f64) -> Position {
        Position {
            id: format!("{market}-{outcome}"),
            user_id: "u1".into(),
            venue: Venue::Polymarket,
            market_id: market.into(),
            outcome_id: outcome.into(),
            side,
            size: value,
            avg_entry_price: 1.0,
            current_price: 1.0,
            opened_at: Utc::now(),
            updated_at: Utc::now(),
            leverage: None,
            margin_mode: None,
            liquidation_price: None,
            notional: None,
        }
    }

    #[test]
    fn empty_portfolio_is_low_risk_not_nan() {
        let result = concentration(&[]);
        assert_eq!(result.hhi, 0.0);
        assert_eq!(result.diversification_score, 100.0);
        assert_eq!(result.risk_level, RiskLevel::Low);
    }

    #[test]
    fn hedge_detection_keys_on_outcome_id_not_side() {
        // Both legs bought outright (the realistic way to hold both sides
        // of a prediction market) still pair up as hedged.
        let positions = vec![pos("m1", "YES", Side::Buy, 100.0), pos("m1", "NO", Side::Buy, 40.0)];
        let pairs = find_hedged_pairs(&positions);
        assert_eq!(pairs.len(), 1);
        assert!((pairs[0].hedge_ratio - 0.40).abs() < 1e-9);
    }

    #[test]
    fn unrelated_long_short_perp_legs_are_not_a_hedge() {
        // Same (venue, marketId) but neither leg is a YES/NO outcome:
        // two unrelated perp positions, not a prediction-market hedge.
        let positions = vec![pos("m1", "PERP", Side::Buy, 100.0), pos("m1", "PERP", Side::Sell, 40.0)];
        assert!(find_hedged_pairs(&positions).is_empty());
    }

    #[test]
    fn same_market_opposite_outcome_is_perfectly_negative() {
        let a = pos("m1", "YES", Side::Buy, 10.0);
        let b = pos("m1", "NO", Side::Sell, 10.0);
        let classified_a = Classified { position: &a, question: "will it rain", category: Category::Weather };
        let classified_b = Classified { position: &b, question: "will it rain", category: Category::Weather };
        let c = correlation(&classified_a, &classified_b);
        assert_eq!(c.value, -1.0);
        assert_eq!(c.kind, CorrelationKind::Negative);
    }

    #[test]
    fn correlation_matrix_diagonal_is_one_and_symmetric() {
        let a = pos("m1", "YES", Side::Buy, 10.0);
        let b = pos("m2", "YES", Side::Buy, 10.0);
        let classified = vec![
            Classified { position: &a, question: "bitcoin price", category: Category::Crypto },
            Classified { position: &b, question: "ethereum price", category: Category::Crypto },
        ];
        let matrix = correlation_matrix(&classified);
        assert_eq!(matrix.values[0][0], 1.0);
        assert_eq!(matrix.values[1][1], 1.0);
        assert_eq!(matrix.values[0][1], matrix.values[1][0]);
    }

    #[test]
    fn category_exposure_percentages_sum_to_at_most_100() {
        let a = pos("m1", "YES", Side::Buy, 60.0);
        let b = pos("m2", "YES", Side::Buy, 40.0);
        let classified = vec![
            Classified { position: &a, question: "bitcoin price", category: Category::Crypto },
            Classified { position: &b, question: "election result", category: Category::Politics },
        ];
        let exposures = category_exposure(&classified);
        let total_pct: f64 = exposures.iter().map(|e| e.value_percent).sum();
        assert!(total_pct <= 100.0 + 1e-6);
        assert!(exposures.iter().all(|e| e.value_percent >= 0.0));
    }
}
