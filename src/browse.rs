use std::cmp::Ordering;

use serde::Deserialize;
use serde_json::Value;

use crate::{
    document_store::DocumentSource,
    error::SyncResult,
    models::{
        integer_value, split_delimited, Document, MovieSummary, DESCRIPTION_FIELD,
        DIRECTOR_FIELD, GENRE_FIELD, RATING_FIELD, RUNTIME_FIELD, TITLE_FIELD, VOTES_FIELD,
        YEAR_FIELD,
    },
};

const UNRATED: &str = "unrated";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovieOrder {
    #[default]
    Title,
    Short,
    Long,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovieQuery {
    pub year: Option<i64>,
    /// Every listed genre must be present on a matching film.
    pub genres: Vec<String>,
    pub order: MovieOrder,
}

pub fn years(source: &dyn DocumentSource) -> SyncResult<Vec<i64>> {
    let mut years: Vec<i64> = source
        .distinct(YEAR_FIELD)?
        .iter()
        .filter_map(integer_value)
        .collect();
    years.sort_unstable_by(|a, b| b.cmp(a));
    years.dedup();
    Ok(years)
}

/// Genres left as delimited strings are split the way `Document::string_list`
/// reads them, so every facet value can be used as a filter.
pub fn genres(source: &dyn DocumentSource) -> SyncResult<Vec<String>> {
    let mut genres: Vec<String> = source
        .distinct(GENRE_FIELD)?
        .iter()
        .filter_map(Value::as_str)
        .flat_map(split_delimited)
        .filter(|genre| !genre.is_empty())
        .collect();
    genres.sort();
    genres.dedup();
    Ok(genres)
}

pub fn find_movies(source: &dyn DocumentSource, query: &MovieQuery) -> SyncResult<Vec<MovieSummary>> {
    let mut movies: Vec<MovieSummary> = source
        .iterate_all()?
        .iter()
        .filter(|doc| !doc.is_design_document())
        .filter(|doc| matches_query(doc, query))
        .map(summarize)
        .collect();

    match query.order {
        MovieOrder::Title => movies.sort_by(|a, b| a.title.cmp(&b.title)),
        MovieOrder::Short => movies.sort_by(compare_runtime),
        MovieOrder::Long => movies.sort_by(|a, b| compare_runtime(b, a)),
    }
    Ok(movies)
}

/// Rated films by rating, then votes, both descending.
pub fn top_rated(source: &dyn DocumentSource, limit: usize) -> SyncResult<Vec<MovieSummary>> {
    let mut movies: Vec<MovieSummary> = source
        .iterate_all()?
        .iter()
        .filter(|doc| !doc.is_design_document())
        .filter(|doc| !matches!(doc.get(RATING_FIELD), Some(Value::String(r)) if r == UNRATED))
        .map(summarize)
        .collect();

    movies.sort_by(|a, b| {
        b.rating
            .partial_cmp(&a.rating)
            .unwrap_or(Ordering::Equal)
            .then(b.votes.cmp(&a.votes))
    });
    movies.truncate(limit);
    Ok(movies)
}

fn matches_query(doc: &Document, query: &MovieQuery) -> bool {
    if let Some(year) = query.year {
        if doc.integer(YEAR_FIELD) != Some(year) {
            return false;
        }
    }
    if query.genres.is_empty() {
        return true;
    }
    let genres = doc.string_list(GENRE_FIELD);
    query.genres.iter().all(|wanted| genres.contains(wanted))
}

// Films without a runtime sort first, as missing keys do in the document store.
fn compare_runtime(a: &MovieSummary, b: &MovieSummary) -> Ordering {
    a.runtime_minutes
        .partial_cmp(&b.runtime_minutes)
        .unwrap_or(Ordering::Equal)
}

fn number(value: Option<&Value>) -> Option<f64> {
    let number = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

pub fn summarize(doc: &Document) -> MovieSummary {
    let directors = match doc.get(DIRECTOR_FIELD) {
        Some(Value::Array(_)) => doc.string_list(DIRECTOR_FIELD),
        Some(Value::String(name)) => vec![name.clone()],
        _ => Vec::new(),
    };

    MovieSummary {
        id: doc.id().ok().flatten(),
        title: doc
            .get(TITLE_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        year: doc.integer(YEAR_FIELD),
        genres: doc.string_list(GENRE_FIELD),
        directors,
        description: doc
            .get(DESCRIPTION_FIELD)
            .and_then(Value::as_str)
            .map(ToString::to_string),
        runtime_minutes: number(doc.get(RUNTIME_FIELD)),
        revenue_millions: doc.revenue(),
        rating: number(doc.get(RATING_FIELD)),
        votes: doc.integer(VOTES_FIELD),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::document_store::SqliteDocumentStore;

    fn catalog() -> SqliteDocumentStore {
        let mut store = SqliteDocumentStore::open_in_memory().expect("store");
        for doc in [
            json!({ "_id": "1", "title": "Guardians", "year": 2014, "genre": ["Action", "Sci-Fi"],
                    "Runtime (Minutes)": 121, "rating": 8.1, "Votes": 757074, "Director": "James Gunn",
                    "Revenue (Millions)": 333.13 }),
            json!({ "_id": "2", "title": "Prometheus", "year": 2012, "genre": ["Adventure", "Sci-Fi"],
                    "Runtime (Minutes)": 124, "rating": 7.0, "Votes": 485820, "Revenue (Millions)": "NA" }),
            json!({ "_id": "3", "title": "Split", "year": 2016, "genre": "Horror,Thriller",
                    "Runtime (Minutes)": 117, "rating": 7.3, "Votes": 157606 }),
            json!({ "_id": "4", "title": "Sing", "year": 2016, "genre": ["Animation"],
                    "Runtime (Minutes)": 108, "rating": "unrated", "Votes": 60545 }),
            json!({ "_id": "5", "title": "Twin", "year": 2016, "genre": ["Drama"],
                    "rating": 7.3, "Votes": 900000 }),
        ] {
            store
                .insert_document(Document::from_value(doc).expect("object"))
                .expect("insert");
        }
        store
    }

    #[test]
    fn facets_are_sorted() {
        let store = catalog();
        assert_eq!(years(&store).expect("years"), vec![2016, 2014, 2012]);
        assert_eq!(
            genres(&store).expect("genres"),
            vec!["Action", "Adventure", "Animation", "Drama", "Horror", "Sci-Fi", "Thriller"]
        );
    }

    #[test]
    fn every_genre_facet_selects_films() {
        let store = catalog();
        for genre in genres(&store).expect("genres") {
            let query = MovieQuery {
                genres: vec![genre.clone()],
                ..MovieQuery::default()
            };
            assert!(
                !find_movies(&store, &query).expect("find").is_empty(),
                "facet {genre} matched nothing"
            );
        }
    }

    #[test]
    fn string_years_and_votes_are_read() {
        let mut store = catalog();
        store
            .insert_document(
                Document::from_value(json!({
                    "_id": "6", "title": "Arrival", "year": "2016", "Votes": "1,234",
                    "revenue": "100.5", "rating": 7.9
                }))
                .expect("object"),
            )
            .expect("insert");

        assert_eq!(years(&store).expect("years"), vec![2016, 2014, 2012]);
        let query = MovieQuery {
            year: Some(2016),
            ..MovieQuery::default()
        };
        let movies = find_movies(&store, &query).expect("find");
        let arrival = movies.iter().find(|m| m.title == "Arrival").expect("present");
        assert_eq!(arrival.year, Some(2016));
        assert_eq!(arrival.votes, Some(1234));
        assert_eq!(arrival.revenue_millions, Some(100.5));
    }

    #[test]
    fn design_documents_never_surface() {
        let mut store = catalog();
        store
            .insert_document(
                Document::from_value(json!({
                    "_id": "_design/ratings", "title": "Meta", "year": 2016, "rating": 9.9,
                    "Votes": 1_000_000
                }))
                .expect("object"),
            )
            .expect("insert");

        let listed = find_movies(&store, &MovieQuery::default()).expect("find");
        assert!(listed.iter().all(|m| m.title != "Meta"));
        let top: Vec<_> = top_rated(&store, 1)
            .expect("top")
            .into_iter()
            .map(|m| m.title)
            .collect();
        assert_eq!(top, vec!["Guardians"]);
    }

    #[test]
    fn genre_filter_requires_every_genre() {
        let store = catalog();
        let query = MovieQuery {
            year: None,
            genres: vec!["Sci-Fi".to_string(), "Action".to_string()],
            order: MovieOrder::Title,
        };
        let titles: Vec<_> = find_movies(&store, &query)
            .expect("find")
            .into_iter()
            .map(|m| m.title)
            .collect();
        assert_eq!(titles, vec!["Guardians"]);

        let unnormalized = MovieQuery {
            year: Some(2016),
            genres: vec!["Horror".to_string()],
            order: MovieOrder::Title,
        };
        assert_eq!(find_movies(&store, &unnormalized).expect("find").len(), 1);
    }

    #[test]
    fn runtime_orders() {
        let store = catalog();
        let query = MovieQuery {
            year: Some(2016),
            genres: Vec::new(),
            order: MovieOrder::Long,
        };
        let titles: Vec<_> = find_movies(&store, &query)
            .expect("find")
            .into_iter()
            .map(|m| m.title)
            .collect();
        assert_eq!(titles, vec!["Split", "Sing", "Twin"]);
    }

    #[test]
    fn ranking_skips_unrated_and_breaks_ties_on_votes() {
        let store = catalog();
        let top: Vec<_> = top_rated(&store, 3)
            .expect("top")
            .into_iter()
            .map(|m| m.title)
            .collect();
        assert_eq!(top, vec!["Guardians", "Twin", "Split"]);
    }

    #[test]
    fn sentinel_revenue_is_hidden() {
        let store = catalog();
        let movies = find_movies(&store, &MovieQuery::default()).expect("find");
        let guardians = movies.iter().find(|m| m.title == "Guardians").expect("present");
        let prometheus = movies.iter().find(|m| m.title == "Prometheus").expect("present");
        assert_eq!(guardians.revenue_millions, Some(333.13));
        assert_eq!(guardians.directors, vec!["James Gunn"]);
        assert_eq!(prometheus.revenue_millions, None);

        let mut store = catalog();
        store
            .insert_document(
                Document::from_value(json!({ "_id": "7", "title": "Odd", "Revenue (Millions)": "NaN" }))
                    .expect("object"),
            )
            .expect("insert");
        let movies = find_movies(&store, &MovieQuery::default()).expect("find");
        let odd = movies.iter().find(|m| m.title == "Odd").expect("present");
        assert_eq!(odd.revenue_millions, None);
    }
}
