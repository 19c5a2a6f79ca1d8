//! End-to-end flow over the in-memory stages: extract → dedupe → embed →
//! cluster → local summary → score. No network, no database; this is the
//! deterministic core the daily run drives.

use uuid::Uuid;

use flashwire_common::config::ScoreWeights;
use flashwire_pipeline::cluster::cluster_vectors;
use flashwire_pipeline::dedupe::DedupeIndex;
use flashwire_pipeline::embed::{embedding_input, HashEmbedder, TextEmbedder};
use flashwire_pipeline::extract::extract_article;
use flashwire_pipeline::score::{flag_top, score_cluster};
use flashwire_pipeline::summarize::local::extractive_summary;

fn id(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

fn page(paragraphs: &[&str]) -> String {
    let body: String = paragraphs.iter().map(|p| format!("<p>{p}</p>")).collect();
    format!("<html><body><article>{body}</article></body></html>")
}

const STORY_A: [&str; 3] = [
    "Artillery fire resumed along the northern frontier early on Monday, with shells \
     landing near the border crossing that reopened only last month after lengthy talks.",
    "Monitors from the regional mission counted more than forty impacts in six hours and \
     urged both capitals to return to the negotiating table before the ceasefire collapses.",
    "Residents of the valley town began moving south in the afternoon as local authorities \
     opened shelters and the rail operator suspended services on the cross-border line.",
];

const STORY_B: [&str; 3] = [
    "Grain exports through the southern corridor reached a record volume in July, port \
     authority figures showed, despite insurance premiums remaining far above prewar levels.",
    "Shipping agents said vessel queues at the strait had shortened to two days as the new \
     inspection regime settled in and storage silos along the coast finally began to empty.",
    "Commodity analysts cautioned that the record pace depends on the harvest holding up \
     and on the corridor agreement surviving its scheduled renewal later this autumn.",
];

/// Articles flow through every stage; light rewrites collapse onto their
/// originals and only topic representatives reach clustering.
#[tokio::test]
async fn five_articles_two_topics_dedupe_then_cluster() {
    let a = [STORY_A[0], STORY_A[1], STORY_A[2]];
    let b = [STORY_B[0], STORY_B[1], STORY_B[2]];
    let a_variant1: Vec<String> = a.iter().map(|p| p.replace("Monday", "Tuesday")).collect();
    let a_variant2: Vec<String> = a.iter().map(|p| p.replace("forty", "fifty")).collect();
    let b_variant: Vec<String> = b.iter().map(|p| p.replace("July", "June")).collect();

    fn as_refs(v: &[String]) -> Vec<&str> {
        v.iter().map(|s| s.as_str()).collect()
    }
    let pages: Vec<(Uuid, String)> = vec![
        (id(1), page(&a)),
        (id(2), page(&as_refs(&a_variant1))),
        (id(3), page(&as_refs(&a_variant2))),
        (id(4), page(&b)),
        (id(5), page(&as_refs(&b_variant))),
    ];

    // Extract.
    let mut bodies = Vec::new();
    for (entry_id, html) in &pages {
        let extraction = extract_article(html, 250).expect("extraction should succeed");
        bodies.push((*entry_id, extraction.text));
    }

    // Dedupe: one-word rewrites share nearly every shingle with their
    // original, so 2, 3, and 5 collapse onto 1 and 4.
    let mut index = DedupeIndex::new(0.8);
    let mut survivors = Vec::new();
    for (entry_id, text) in &bodies {
        let verdict = index.check_and_register(*entry_id, text);
        if !verdict.is_duplicate() {
            survivors.push((*entry_id, text.clone()));
        }
    }
    // Representatives are the smallest ids of their equivalence classes.
    let survivor_ids: Vec<Uuid> = survivors.iter().map(|(e, _)| *e).collect();
    assert_eq!(survivor_ids, vec![id(1), id(4)]);

    // Embed survivors.
    let embedder = HashEmbedder::new(384);
    let texts: Vec<String> = survivors
        .iter()
        .map(|(_, text)| embedding_input("headline", text))
        .collect();
    let vectors = embedder.embed_batch(&texts).await.unwrap();
    for v in &vectors {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    // Cluster.
    let items: Vec<(Uuid, Vec<f32>)> = survivors
        .iter()
        .map(|(e, _)| *e)
        .zip(vectors.into_iter())
        .collect();
    let assignments = cluster_vectors(&items, 10, 0.65);
    assert_eq!(assignments.len(), survivors.len());

    // Dense ids from 1, non-increasing sizes.
    let max_id = assignments.iter().map(|a| a.cluster_id).max().unwrap();
    let mut sizes = Vec::new();
    for cluster_id in 1..=max_id {
        let size = assignments.iter().filter(|a| a.cluster_id == cluster_id).count();
        assert!(size > 0, "gap at cluster {cluster_id}");
        sizes.push(size);
    }
    assert!(sizes.windows(2).all(|w| w[0] >= w[1]));

    // Summaries and scores per cluster.
    let mut scores = Vec::new();
    for cluster_id in 1..=max_id {
        let members: Vec<&(Uuid, String)> = assignments
            .iter()
            .filter(|a| a.cluster_id == cluster_id)
            .map(|a| survivors.iter().find(|(e, _)| *e == a.entry_id).unwrap())
            .collect();

        let summary = extractive_summary(&members[0].1, 80);
        assert!(!summary.is_empty());
        assert!(summary.split_whitespace().count() <= 80);

        scores.push(score_cluster(
            cluster_id,
            members.len(),
            members.len(), // one domain per member in this synthetic setup
            1,
            &[],
            &ScoreWeights::default(),
        ));
    }
    flag_top(&mut scores, 0.10);
    assert_eq!(scores.iter().filter(|s| s.flagged).count(), 1);
}

/// A paraphrase pair dedupes to the smaller id and clusters exclude it.
#[tokio::test]
async fn near_duplicate_is_excluded_before_clustering() {
    let original = format!("{} {} {}", STORY_A[0], STORY_A[1], STORY_A[2]);
    let paraphrase = original.replace("Monday", "Tuesday").replace("forty", "fifty");
    let unrelated = format!("{} {} {}", STORY_B[0], STORY_B[1], STORY_B[2]);

    let mut index = DedupeIndex::new(0.8);
    assert!(!index.check_and_register(id(10), &original).is_duplicate());
    let verdict = index.check_and_register(id(11), &paraphrase);
    assert!(verdict.is_duplicate());
    assert_eq!(verdict.duplicate_of, Some(id(10)));
    assert!(!index.check_and_register(id(12), &unrelated).is_duplicate());

    let embedder = HashEmbedder::new(384);
    let texts = vec![original.clone(), unrelated.clone()];
    let vectors = embedder.embed_batch(&texts).await.unwrap();
    let items = vec![(id(10), vectors[0].clone()), (id(12), vectors[1].clone())];

    let assignments = cluster_vectors(&items, 10, 0.65);
    assert_eq!(assignments.len(), 2);
    assert!(assignments.iter().all(|a| a.entry_id != id(11)));
}
