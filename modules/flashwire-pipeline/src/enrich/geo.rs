//! Country resolution: LOC and GPE surface forms become ISO-3166 country
//! records with mention counts. Non-country toponyms drop out.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use flashwire_common::types::GeoEntity;

use super::ner::{EntityMention, NerOutput};

/// Colloquial names the ISO table doesn't carry.
static ALIASES: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    // alias -> alpha2
    HashMap::from([
        ("usa", "US"),
        ("u.s.", "US"),
        ("u.s.a.", "US"),
        ("united states of america", "US"),
        ("united states", "US"),
        ("america", "US"),
        ("uk", "GB"),
        ("u.k.", "GB"),
        ("britain", "GB"),
        ("great britain", "GB"),
        ("england", "GB"),
        ("russia", "RU"),
        ("south korea", "KR"),
        ("north korea", "KP"),
        ("iran", "IR"),
        ("syria", "SY"),
        ("palestine", "PS"),
        ("taiwan", "TW"),
        ("czech republic", "CZ"),
        ("czechia", "CZ"),
        ("ivory coast", "CI"),
        ("congo", "CG"),
        ("dr congo", "CD"),
        ("drc", "CD"),
        ("uae", "AE"),
        ("vietnam", "VN"),
        ("laos", "LA"),
        ("bolivia", "BO"),
        ("venezuela", "VE"),
        ("moldova", "MD"),
        ("tanzania", "TZ"),
        ("turkey", "TR"),
        ("türkiye", "TR"),
    ])
});

/// Resolve a location name to (name, alpha2, alpha3). Returns None for
/// non-countries.
pub fn resolve_country(name: &str) -> Option<(String, String, String)> {
    let key = name.trim().to_lowercase();
    if key.is_empty() {
        return None;
    }

    if let Some(&alpha2) = ALIASES.get(key.as_str()) {
        let country = rust_iso3166::from_alpha2(alpha2)?;
        return Some((
            display_name(&country),
            country.alpha2.to_string(),
            country.alpha3.to_string(),
        ));
    }

    // Bare codes show up in source-country fields.
    let upper = name.trim().to_ascii_uppercase();
    if upper.len() == 2 {
        if let Some(country) = rust_iso3166::from_alpha2(&upper) {
            return Some((
                display_name(&country),
                country.alpha2.to_string(),
                country.alpha3.to_string(),
            ));
        }
    }
    if upper.len() == 3 {
        if let Some(country) = rust_iso3166::from_alpha3(&upper) {
            return Some((
                display_name(&country),
                country.alpha2.to_string(),
                country.alpha3.to_string(),
            ));
        }
    }

    // Full-name scan, case-insensitive.
    rust_iso3166::ALL.iter().find_map(|country| {
        if country.name.to_lowercase() == key {
            Some((
                display_name(country),
                country.alpha2.to_string(),
                country.alpha3.to_string(),
            ))
        } else {
            None
        }
    })
}

/// Prefer the short conventional name over the official ISO long form where
/// the alias table knows better.
fn display_name(country: &rust_iso3166::CountryCode) -> String {
    match country.alpha2 {
        "US" => "United States".to_string(),
        "GB" => "United Kingdom".to_string(),
        "RU" => "Russia".to_string(),
        "KR" => "South Korea".to_string(),
        "KP" => "North Korea".to_string(),
        "IR" => "Iran".to_string(),
        "SY" => "Syria".to_string(),
        "CD" => "DR Congo".to_string(),
        _ => country.name.to_string(),
    }
}

/// Build the `geo_entities` records from NER output. Mentions aggregate per
/// country; ordering is mentions DESC then name ASC. The entry's declared
/// source country contributes one mention when it resolves and is absent.
pub fn resolve_geo_entities(ner: &NerOutput, source_country: Option<&str>) -> Vec<GeoEntity> {
    let mut by_alpha3: BTreeMap<String, GeoEntity> = BTreeMap::new();

    let mentions = ner
        .entities
        .iter()
        .filter(|(class, _)| class.as_str() == "LOC" || class.as_str() == "GPE")
        .flat_map(|(_, mentions)| mentions.iter());

    for EntityMention { text, .. } in mentions {
        if let Some((name, alpha2, alpha3)) = resolve_country(text) {
            by_alpha3
                .entry(alpha3.clone())
                .and_modify(|g| g.mentions += 1)
                .or_insert(GeoEntity {
                    name,
                    alpha2,
                    alpha3,
                    mentions: 1,
                });
        }
    }

    if let Some(source) = source_country {
        if let Some((name, alpha2, alpha3)) = resolve_country(source) {
            by_alpha3.entry(alpha3.clone()).or_insert(GeoEntity {
                name,
                alpha2,
                alpha3,
                mentions: 1,
            });
        }
    }

    let mut out: Vec<GeoEntity> = by_alpha3.into_values().collect();
    out.sort_by(|a, b| b.mentions.cmp(&a.mentions).then_with(|| a.name.cmp(&b.name)));
    out
}

pub fn geo_entities_json(entities: &[GeoEntity]) -> serde_json::Value {
    serde_json::to_value(entities).unwrap_or_else(|_| serde_json::Value::Array(Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::ner::{aggregate_spans, RawSpan};

    fn ner_with(locs: &[&str], gpes: &[&str]) -> NerOutput {
        let mut spans = Vec::new();
        for l in locs {
            spans.push(RawSpan {
                entity_group: "LOC".into(),
                score: 0.9,
                word: l.to_string(),
            });
        }
        for g in gpes {
            spans.push(RawSpan {
                entity_group: "GPE".into(),
                score: 0.9,
                word: g.to_string(),
            });
        }
        aggregate_spans(spans, "m", 100, 1)
    }

    #[test]
    fn aliases_resolve() {
        let (name, a2, a3) = resolve_country("USA").unwrap();
        assert_eq!((name.as_str(), a2.as_str(), a3.as_str()), ("United States", "US", "USA"));
        assert_eq!(resolve_country("Britain").unwrap().1, "GB");
    }

    #[test]
    fn exact_iso_names_resolve() {
        assert_eq!(resolve_country("France").unwrap().1, "FR");
        assert_eq!(resolve_country("japan").unwrap().1, "JP");
    }

    #[test]
    fn bare_codes_resolve() {
        assert_eq!(resolve_country("BR").unwrap().2, "BRA");
        assert_eq!(resolve_country("deu").unwrap().1, "DE");
    }

    #[test]
    fn non_countries_drop() {
        assert!(resolve_country("Mount Everest").is_none());
        assert!(resolve_country("Paris").is_none());
        assert!(resolve_country("").is_none());
    }

    #[test]
    fn mentions_aggregate_and_order() {
        // NER dedupes surface forms, so distinct spellings carry the count.
        let ner = ner_with(&["Brazil", "brazil"], &["France", "Brasil"]);
        let geo = resolve_geo_entities(&ner, None);
        // "Brasil" doesn't resolve; Brazil appears once in LOC (deduped), France once.
        assert_eq!(geo.len(), 2);
        assert_eq!(geo[0].mentions, geo[1].mentions);
        // Tie broken by name ascending.
        assert_eq!(geo[0].name, "Brazil");
        assert_eq!(geo[1].name, "France");
    }

    #[test]
    fn distinct_class_mentions_count_separately() {
        let ner = ner_with(&["France"], &["France"]);
        let geo = resolve_geo_entities(&ner, None);
        assert_eq!(geo.len(), 1);
        assert_eq!(geo[0].mentions, 2);
    }

    #[test]
    fn source_country_appended_once() {
        let ner = ner_with(&[], &[]);
        let geo = resolve_geo_entities(&ner, Some("UA"));
        assert_eq!(geo.len(), 1);
        assert_eq!(geo[0].alpha2, "UA");
        assert_eq!(geo[0].mentions, 1);

        let ner = ner_with(&["Ukraine"], &[]);
        let geo = resolve_geo_entities(&ner, Some("UA"));
        assert_eq!(geo.len(), 1);
        assert_eq!(geo[0].mentions, 1);
    }
}
