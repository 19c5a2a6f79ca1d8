//! Hotspot scoring: four normalized components, weighted sum, top-K
//! flagging.

use chrono::{DateTime, Duration, Utc};

use flashwire_common::config::ScoreWeights;

/// Members inside this window of the newest sighting count as "bursty".
const BURST_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone)]
pub struct HotspotScore {
    pub cluster_id: i32,
    pub score: f64,
    pub volume: f64,
    pub domain_diversity: f64,
    pub language_diversity: f64,
    pub burstiness: f64,
    pub flagged: bool,
}

/// Score one cluster. Every component lands in [0, 1].
///
/// - volume: log-scaled member count, saturating at 100 articles
/// - domain diversity: log-scaled unique source domains, saturating at 20
/// - language diversity: unique languages, saturating at 5
/// - burstiness: share of members seen within 24h of the newest member
pub fn score_cluster(
    cluster_id: i32,
    member_count: usize,
    unique_domains: usize,
    unique_languages: usize,
    seendates: &[DateTime<Utc>],
    weights: &ScoreWeights,
) -> HotspotScore {
    let volume = ((member_count as f64 + 1.0).log2() / 101f64.log2()).min(1.0);
    let domain_diversity = ((unique_domains as f64 + 1.0).log2() / 20f64.log2()).min(1.0);
    let language_diversity = (unique_languages as f64 / 5.0).min(1.0);
    let burstiness = burstiness_of(seendates);

    let score = weights.volume * volume
        + weights.domains * domain_diversity
        + weights.languages * language_diversity
        + weights.burst * burstiness;

    HotspotScore {
        cluster_id,
        score: round4(score),
        volume: round4(volume),
        domain_diversity: round4(domain_diversity),
        language_diversity: round4(language_diversity),
        burstiness: round4(burstiness),
        flagged: false,
    }
}

/// Temporal concentration of sightings. No dates, no signal.
fn burstiness_of(seendates: &[DateTime<Utc>]) -> f64 {
    let Some(newest) = seendates.iter().max() else {
        return 0.0;
    };
    let window = Duration::hours(BURST_WINDOW_HOURS);
    let in_window = seendates.iter().filter(|d| *newest - **d <= window).count();
    in_window as f64 / seendates.len() as f64
}

/// Flag the top share of scorers, always at least one when any exist.
/// Ordering ties break toward the lower cluster id.
pub fn flag_top(scores: &mut [HotspotScore], top_pct: f64) {
    if scores.is_empty() {
        return;
    }
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .score
            .partial_cmp(&scores[a].score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| scores[a].cluster_id.cmp(&scores[b].cluster_id))
    });

    let take = ((scores.len() as f64 * top_pct).floor() as usize).max(1);
    for &i in order.iter().take(take) {
        scores[i].flagged = true;
    }
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights() -> ScoreWeights {
        ScoreWeights::default()
    }

    fn hours_ago(h: i64) -> DateTime<Utc> {
        Utc::now() - Duration::hours(h)
    }

    #[test]
    fn components_stay_in_unit_interval() {
        let dates: Vec<_> = (0..500).map(|i| hours_ago(i % 72)).collect();
        let s = score_cluster(1, 5000, 500, 40, &dates, &weights());
        for component in [s.volume, s.domain_diversity, s.language_diversity, s.burstiness] {
            assert!((0.0..=1.0).contains(&component), "component {component} out of range");
        }
        assert!(s.score <= 1.0001);
    }

    #[test]
    fn bigger_clusters_score_higher() {
        let a = score_cluster(1, 50, 5, 2, &[], &weights());
        let b = score_cluster(2, 3, 5, 2, &[], &weights());
        assert!(a.score > b.score);
    }

    #[test]
    fn burstiness_rewards_tight_windows() {
        let tight: Vec<_> = (0..6).map(|i| hours_ago(i)).collect();
        let spread: Vec<_> = (0..6).map(|i| hours_ago(i * 48)).collect();
        let a = score_cluster(1, 6, 3, 1, &tight, &weights());
        let b = score_cluster(2, 6, 3, 1, &spread, &weights());
        assert_eq!(a.burstiness, 1.0);
        assert!(b.burstiness < a.burstiness);
    }

    #[test]
    fn no_dates_means_zero_burstiness() {
        let s = score_cluster(1, 4, 2, 1, &[], &weights());
        assert_eq!(s.burstiness, 0.0);
    }

    #[test]
    fn flagging_takes_top_share_with_floor_of_one() {
        let mut scores: Vec<_> = (1..=20)
            .map(|i| score_cluster(i, i as usize, 2, 1, &[], &weights()))
            .collect();
        flag_top(&mut scores, 0.10);
        let flagged: Vec<i32> = scores.iter().filter(|s| s.flagged).map(|s| s.cluster_id).collect();
        // 10% of 20 = 2; the two biggest clusters.
        assert_eq!(flagged, vec![19, 20]);

        let mut single = vec![score_cluster(1, 2, 1, 1, &[], &weights())];
        flag_top(&mut single, 0.10);
        assert!(single[0].flagged);
    }

    #[test]
    fn flag_ties_prefer_lower_cluster_id() {
        let mut scores = vec![
            score_cluster(2, 5, 2, 1, &[], &weights()),
            score_cluster(1, 5, 2, 1, &[], &weights()),
        ];
        flag_top(&mut scores, 0.10);
        let flagged: Vec<i32> = scores.iter().filter(|s| s.flagged).map(|s| s.cluster_id).collect();
        assert_eq!(flagged, vec![1]);
    }
}
