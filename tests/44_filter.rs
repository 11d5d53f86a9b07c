mod common;

use anyhow::Result;
use common::TestServer;
use reqwest::StatusCode;
use serde_json::Value;

// These tests verify the list query surface: operators, select, sort, paging.
// Each builds one bootcamp with five courses through the HTTP API.

const TUITIONS: [i64; 5] = [4000, 8000, 10000, 12000, 15000];

async fn seeded() -> Result<(TestServer, String)> {
    let server = TestServer::spawn().await?;
    let admin = server.admin("root@example.com").await?;
    let camp = server.create_bootcamp(&admin, "Filter Camp").await?;
    for (i, tuition) in TUITIONS.iter().enumerate() {
        let res = server
            .add_course(&admin, &camp, &format!("Course {}", i), *tuition, 4 + i as i64)
            .await?;
        assert_eq!(res.status(), StatusCode::CREATED);
    }
    Ok((server, camp))
}

async fn list(server: &TestServer, query: &str) -> Result<Value> {
    let res = server
        .client
        .get(server.url(&format!("/api/v1/courses?{}", query)))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK, "unexpected status for {}", query);
    Ok(res.json().await?)
}

fn tuitions(body: &Value) -> Vec<i64> {
    body["data"]
        .as_array()
        .map(|items| items.iter().filter_map(|c| c["tuition"].as_i64()).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn comparison_operators() -> Result<()> {
    let (server, _) = seeded().await?;

    let body = list(&server, "tuition[gte]=10000&sort=tuition").await?;
    assert_eq!(tuitions(&body), vec![10000, 12000, 15000]);
    assert_eq!(body["count"].as_u64(), Some(3));

    let body = list(&server, "tuition[lt]=10000&sort=tuition").await?;
    assert_eq!(tuitions(&body), vec![4000, 8000]);

    let body = list(&server, "tuition=gt:12000").await?;
    assert_eq!(tuitions(&body), vec![15000]);

    let body = list(&server, "tuition[in]=4000,15000&sort=-tuition").await?;
    assert_eq!(tuitions(&body), vec![15000, 4000]);

    let body = list(&server, "tuition[gte]=8000&tuition[lte]=12000&sort=tuition").await?;
    assert_eq!(tuitions(&body), vec![8000, 10000, 12000]);
    Ok(())
}

#[tokio::test]
async fn select_keeps_id_and_named_fields() -> Result<()> {
    let (server, _) = seeded().await?;

    let body = list(&server, "select=title,tuition").await?;
    for course in body["data"].as_array().cloned().unwrap_or_default() {
        let keys: Vec<&String> = course.as_object().map(|o| o.keys().collect()).unwrap_or_default();
        assert!(course.get("id").is_some(), "missing id: {}", course);
        assert!(course.get("title").is_some());
        assert!(course.get("description").is_none(), "unexpected keys {:?}", keys);
    }
    Ok(())
}

#[tokio::test]
async fn pagination_is_bounded() -> Result<()> {
    let (server, _) = seeded().await?;

    let first = list(&server, "sort=tuition&limit=2&page=1").await?;
    let second = list(&server, "sort=tuition&limit=2&page=2").await?;
    let third = list(&server, "sort=tuition&limit=2&page=3").await?;
    assert_eq!(tuitions(&first), vec![4000, 8000]);
    assert_eq!(tuitions(&second), vec![10000, 12000]);
    assert_eq!(tuitions(&third), vec![15000]);

    // nonsense paging falls back to defaults
    let body = list(&server, "limit=-5&page=abc").await?;
    assert_eq!(body["count"].as_u64(), Some(5));

    let far = list(&server, "page=18446744073709551615&limit=100000").await?;
    assert_eq!(far["count"].as_u64(), Some(0));
    Ok(())
}

#[tokio::test]
async fn default_sort_is_newest_first() -> Result<()> {
    let (server, _) = seeded().await?;
    let body = list(&server, "").await?;
    assert_eq!(tuitions(&body), vec![15000, 12000, 10000, 8000, 4000]);
    Ok(())
}

#[tokio::test]
async fn hostile_parameters_never_reach_the_store() -> Result<()> {
    let (server, _) = seeded().await?;

    for query in [
        "$where=sleep(1000)",
        "password_hash=x",
        "tuition[$ne]=1&select=$where",
        "sort=$natural",
        "title[regex]=.*&title=%27%3B%20DROP%20TABLE%20courses%3B--",
        "weeks=not-a-number",
    ] {
        let res = server
            .client
            .get(server.url(&format!("/api/v1/courses?{}", query)))
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::OK, "{}", query);
    }

    // unknown fields are dropped, so the listing is unfiltered
    let body = list(&server, "$where=sleep(1000)&password_hash=x").await?;
    assert_eq!(body["count"].as_u64(), Some(5));

    // a value that matches nothing filters everything out rather than erroring
    let body = list(&server, "title=%27%3B%20DROP%20TABLE%20courses%3B--").await?;
    assert_eq!(body["count"].as_u64(), Some(0));

    // data survived
    let body = list(&server, "").await?;
    assert_eq!(body["count"].as_u64(), Some(5));
    Ok(())
}

#[tokio::test]
async fn bootcamp_children_are_scoped_to_parent() -> Result<()> {
    let (server, camp) = seeded().await?;
    let admin = server.admin("second-root@example.com").await?;
    let other = server.create_bootcamp(&admin, "Other Camp").await?;
    server.add_course(&admin, &other, "Elsewhere", 999, 2).await?;

    // a bootcamp filter in the query cannot widen the scope
    let res = server
        .client
        .get(server.url(&format!("/api/v1/bootcamps/{}/courses?bootcamp={}", camp, other)))
        .send()
        .await?;
    let body: Value = res.json().await?;
    assert_eq!(body["count"].as_u64(), Some(5));
    assert!(!tuitions(&body).contains(&999));
    Ok(())
}
