use std::time::Duration;

use chrono::NaiveDate;
use mockito::Matcher;

use watchscout_lib::api::{
    CatalogClient, CatalogSource, Continuation, HomePageRequest, MediaType, Partition,
    SearchPageRequest,
};
use watchscout_lib::errors::CatalogError;
use watchscout_lib::fingerprint::{ContentMode, FilterPreferences};

fn client(url: String) -> CatalogClient {
    CatalogClient::new(url, Some("secret".to_string()), Duration::from_secs(5))
}

fn search_request(page: u32, limit: usize) -> SearchPageRequest {
    SearchPageRequest {
        query: "batman".to_string(),
        page,
        limit,
        media_type: MediaType::Movie,
        filters: FilterPreferences::default().catalog_filters(),
    }
}

#[tokio::test]
async fn home_page_request_and_parse() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/home")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("page".into(), "1".into()),
            Matcher::UrlEncoded("page_size".into(), "6".into()),
            Matcher::UrlEncoded("media_type".into(), "all".into()),
            Matcher::UrlEncoded("countries".into(), "DE,US".into()),
            Matcher::UrlEncoded("providers".into(), "8,337".into()),
            Matcher::UrlEncoded("monetization".into(), "free,ads".into()),
            Matcher::UrlEncoded("api_key".into(), "secret".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "sections": [
                    {"id": "trending", "title": "Trending", "next_cursor": "abc",
                     "items": [
                        {"tmdb_id": "movie/603", "media_type": "movie", "title": "The Matrix", "release_date": "1999-03-31"},
                        {"id": "1399", "show_type": "series", "name": "Game of Thrones", "first_air_date": "2011-04-17"},
                        {"title": "No id"}
                     ]},
                    {"id": "free", "title": "Free", "total_pages": "3", "items": []}
                ],
                "total_pages": 4
            }"#,
        )
        .create_async()
        .await;

    let preferences = FilterPreferences {
        provider_ids: vec![337, 8, 8],
        countries: vec!["us".to_string(), "de".to_string()],
        content_mode: ContentMode::Free,
        ..Default::default()
    };
    let request = HomePageRequest {
        page: 1,
        page_size: 6,
        partition: Partition::Mixed,
        filters: preferences.catalog_filters(),
    };

    let page = client(server.url()).fetch_home_page(&request).await.unwrap();
    mock.assert_async().await;

    assert!(page.has_more);
    assert_eq!(page.next_page, Some(2));
    assert_eq!(page.items.len(), 2);

    let trending = &page.items[0];
    assert_eq!(trending.continuation, Some(Continuation::Cursor("abc".to_string())));
    assert_eq!(trending.items.len(), 2);
    assert_eq!(trending.items[0].id, 603);
    assert_eq!(trending.items[0].release_date, NaiveDate::from_ymd_opt(1999, 3, 31));
    assert_eq!(trending.items[1].media_type, MediaType::Tv);
    assert_eq!(trending.items[1].title, "Game of Thrones");

    assert!(page.items[1].has_more());
}

#[tokio::test]
async fn section_continues_by_cursor() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/home/sections/trending")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("cursor".into(), "abc".into()),
            Matcher::UrlEncoded("media_type".into(), "movie".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"results": [{"id": 11, "title": "Star Wars"}], "nextCursor": "def"}"#)
        .create_async()
        .await;

    let page = client(server.url())
        .fetch_section(
            "trending",
            &Continuation::Cursor("abc".to_string()),
            Partition::Movie,
            &FilterPreferences::default().catalog_filters(),
        )
        .await
        .unwrap();
    mock.assert_async().await;

    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].media_type, MediaType::Movie);
    assert_eq!(page.continuation, Some(Continuation::Cursor("def".to_string())));
}

#[tokio::test]
async fn search_page_reports_total() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/search/multi")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("q".into(), "batman".into()),
            Matcher::UrlEncoded("page".into(), "2".into()),
            Matcher::UrlEncoded("limit".into(), "40".into()),
            Matcher::UrlEncoded("media_type".into(), "movie".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"results": [{"id": 268, "title": "Batman", "year": 1989, "popularity": "31.5"}], "page": 2, "total_pages": 3}"#)
        .create_async()
        .await;

    let page = client(server.url()).fetch_search_page(&search_request(2, 40)).await.unwrap();
    mock.assert_async().await;

    assert!(page.has_more);
    assert_eq!(page.total_pages, Some(3));
    assert_eq!(page.items[0].popularity, Some(31.5));
    assert_eq!(page.items[0].release_date, NaiveDate::from_ymd_opt(1989, 1, 1));
}

#[tokio::test]
async fn status_codes_map_to_error_classes() {
    let mut server = mockito::Server::new_async().await;
    let _rejected = server
        .mock("GET", "/api/search/multi")
        .match_query(Matcher::UrlEncoded("limit".into(), "40".into()))
        .with_status(422)
        .with_body("limit must be <= 20")
        .create_async()
        .await;
    let _missing = server
        .mock("GET", "/api/search/multi")
        .match_query(Matcher::UrlEncoded("limit".into(), "20".into()))
        .with_status(404)
        .create_async()
        .await;
    let _broken = server
        .mock("GET", "/api/search")
        .match_query(Matcher::Any)
        .with_status(502)
        .create_async()
        .await;

    let client = client(server.url());
    let err = client.fetch_search_page(&search_request(1, 40)).await.unwrap_err();
    assert_eq!(err, CatalogError::Validation("limit must be <= 20".to_string()));

    let err = client.fetch_search_page(&search_request(1, 20)).await.unwrap_err();
    assert!(err.is_not_found());

    let err = client.fetch_search_legacy("batman", 60).await.unwrap_err();
    assert!(matches!(err, CatalogError::Server(502, _)));
}

#[tokio::test]
async fn malformed_body_is_a_parse_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/search/multi")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("<html>maintenance</html>")
        .create_async()
        .await;

    let err = client(server.url()).fetch_search_page(&search_request(1, 40)).await.unwrap_err();
    assert!(matches!(err, CatalogError::Parse(_)));
}

#[tokio::test]
async fn legacy_search_is_capped() {
    let mut server = mockito::Server::new_async().await;
    let results: Vec<String> = (1..=5)
        .map(|id| format!(r#"{{"id": {}, "title": "Result {}"}}"#, id, id))
        .collect();
    let _mock = server
        .mock("GET", "/api/search")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("q".into(), "batman".into()),
            Matcher::UrlEncoded("limit".into(), "3".into()),
        ]))
        .with_status(200)
        .with_body(format!(r#"{{"results": [{}]}}"#, results.join(",")))
        .create_async()
        .await;

    let items = client(server.url()).fetch_search_legacy("batman", 3).await.unwrap();
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(|i| i.media_type == MediaType::Movie));
}

#[tokio::test]
async fn unreachable_catalog_is_a_network_error() {
    let client = CatalogClient::new("http://127.0.0.1:9".to_string(), None, Duration::from_secs(2));
    let err = client.fetch_search_legacy("batman", 60).await.unwrap_err();
    assert!(matches!(err, CatalogError::Network(_) | CatalogError::Timeout(_, _)));
}
