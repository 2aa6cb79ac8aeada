//! Live integration tests for surveydesk-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/surveydesk-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory.

use chrono::{TimeDelta, TimeZone, Utc};
use surveydesk_core::{
    CategoryCount, CrimeSummary, FindingPayload, FindingStatus, JobStatus, JobType,
    RateLimitPolicy, POLICE_CRIME,
};
use surveydesk_db::{
    check_and_consume, create_job, get_job, job_dashboard_stats, list_findings_for_job,
    list_jobs_for_org, list_portals_for_org, list_sources, record_geocode, transition_job_status,
    upsert_finding, Admission, DbError, GeocodeUpdate, NewJob,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_job<'a>(org_id: &'a str, postcode: &'a str) -> NewJob<'a> {
    NewJob {
        org_id,
        created_by: "actor-1",
        job_type: JobType::Survey,
        address_line1: "10 Downing Street",
        town: Some("London"),
        postcode,
        client_name: None,
    }
}

fn crime_summary(total: usize) -> FindingPayload {
    FindingPayload::CrimeSummary(CrimeSummary {
        period: "Latest available month".to_string(),
        total_crimes: total,
        top_categories: vec![CategoryCount {
            name: "burglary".to_string(),
            count: total,
        }],
        disclaimer: "Area-based anonymised data; not property-specific.".to_string(),
    })
}

// ---------------------------------------------------------------------------
// Section 1: Jobs
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn created_job_starts_ungeocoded_and_not_started(pool: sqlx::PgPool) {
    let job = create_job(&pool, &new_job("org-a", "SW1A 2AA"))
        .await
        .expect("create_job failed");

    assert_eq!(job.status, "NOT_STARTED");
    assert_eq!(job.job_type, "SURVEY");
    assert!(job.lat.is_none() && job.lon.is_none());
    assert!(job.geocode_source.is_none() && job.geocoded_at.is_none());

    let fetched = get_job(&pool, job.id)
        .await
        .expect("get_job failed")
        .expect("job exists");
    assert_eq!(fetched.org_id, "org-a");
}

#[sqlx::test(migrations = "../../migrations")]
async fn jobs_are_listed_per_org_newest_first(pool: sqlx::PgPool) {
    let first = create_job(&pool, &new_job("org-a", "SW1A 2AA"))
        .await
        .expect("create first");
    let second = create_job(&pool, &new_job("org-a", "EC1A 1BB"))
        .await
        .expect("create second");
    create_job(&pool, &new_job("org-b", "M1 1AE"))
        .await
        .expect("create other org");

    // Pin creation order so the ordering check does not depend on clock resolution.
    sqlx::query("UPDATE jobs SET created_at = NOW() - INTERVAL '1 hour' WHERE id = $1")
        .bind(first.id)
        .execute(&pool)
        .await
        .expect("backdate");

    let jobs = list_jobs_for_org(&pool, "org-a", 50)
        .await
        .expect("list_jobs_for_org failed");
    let ids: Vec<_> = jobs.iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn geocode_sets_coordinates_and_provenance_together(pool: sqlx::PgPool) {
    let job = create_job(&pool, &new_job("org-a", "sw1a 2aa"))
        .await
        .expect("create_job failed");
    let at = Utc.with_ymd_and_hms(2025, 10, 1, 9, 30, 0).unwrap();

    let updated = record_geocode(
        &pool,
        job.id,
        &GeocodeUpdate {
            latitude: 51.50354,
            longitude: -0.127695,
            postcode_normalised: "SW1A2AA",
            source: "postcodes.io",
            geocoded_at: at,
        },
    )
    .await
    .expect("record_geocode failed");

    assert_eq!(updated.postcode_normalised.as_deref(), Some("SW1A2AA"));
    assert_eq!(updated.geocode_source.as_deref(), Some("postcodes.io"));
    assert_eq!(updated.geocoded_at, Some(at));
    assert!(updated.lat.is_some() && updated.lon.is_some());
}

#[sqlx::test(migrations = "../../migrations")]
async fn partial_geocode_is_rejected_by_schema(pool: sqlx::PgPool) {
    let job = create_job(&pool, &new_job("org-a", "SW1A 2AA"))
        .await
        .expect("create_job failed");

    let result = sqlx::query("UPDATE jobs SET lat = 51.5, lon = -0.12 WHERE id = $1")
        .bind(job.id)
        .execute(&pool)
        .await;
    assert!(result.is_err(), "coordinates without provenance must be rejected");
}

#[sqlx::test(migrations = "../../migrations")]
async fn record_geocode_for_missing_job_is_not_found(pool: sqlx::PgPool) {
    let err = record_geocode(
        &pool,
        uuid::Uuid::new_v4(),
        &GeocodeUpdate {
            latitude: 0.0,
            longitude: 0.0,
            postcode_normalised: "X",
            source: "postcodes.io",
            geocoded_at: Utc::now(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, DbError::NotFound));
}

#[sqlx::test(migrations = "../../migrations")]
async fn status_transitions_follow_lifecycle(pool: sqlx::PgPool) {
    let job = create_job(&pool, &new_job("org-a", "SW1A 2AA"))
        .await
        .expect("create_job failed");

    let err = transition_job_status(&pool, job.id, JobStatus::Complete)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DbError::InvalidTransition {
            from: JobStatus::NotStarted,
            to: JobStatus::Complete,
            ..
        }
    ));

    let started = transition_job_status(&pool, job.id, JobStatus::InProgress)
        .await
        .expect("start");
    assert_eq!(started.status, "IN_PROGRESS");

    let done = transition_job_status(&pool, job.id, JobStatus::Complete)
        .await
        .expect("complete");
    assert_eq!(done.status, "COMPLETE");

    let reopened = transition_job_status(&pool, job.id, JobStatus::InProgress)
        .await
        .expect("reopen");
    assert_eq!(reopened.status, "IN_PROGRESS");
}

#[sqlx::test(migrations = "../../migrations")]
async fn dashboard_counts_by_status(pool: sqlx::PgPool) {
    let a = create_job(&pool, &new_job("org-a", "SW1A 2AA")).await.expect("a");
    let b = create_job(&pool, &new_job("org-a", "EC1A 1BB")).await.expect("b");
    create_job(&pool, &new_job("org-a", "M1 1AE")).await.expect("c");
    create_job(&pool, &new_job("org-b", "LS1 1UR")).await.expect("d");

    transition_job_status(&pool, a.id, JobStatus::InProgress).await.expect("a start");
    transition_job_status(&pool, b.id, JobStatus::InProgress).await.expect("b start");
    transition_job_status(&pool, b.id, JobStatus::Complete).await.expect("b complete");

    let counts = job_dashboard_stats(&pool, "org-a").await.expect("stats");
    assert_eq!(counts.active_jobs, 1);
    assert_eq!(counts.completed_jobs, 1);
    assert_eq!(counts.total_jobs, 3);
}

// ---------------------------------------------------------------------------
// Section 2: Findings
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn upsert_replaces_finding_for_same_job_and_source(pool: sqlx::PgPool) {
    let job = create_job(&pool, &new_job("org-a", "SW1A 2AA"))
        .await
        .expect("create_job failed");

    let first = upsert_finding(
        &pool,
        job.id,
        POLICE_CRIME,
        FindingStatus::Complete,
        &crime_summary(4),
        Utc::now(),
    )
    .await
    .expect("first upsert");
    let second = upsert_finding(
        &pool,
        job.id,
        POLICE_CRIME,
        FindingStatus::Complete,
        &crime_summary(11),
        Utc::now(),
    )
    .await
    .expect("second upsert");

    assert_eq!(first.id, second.id, "the same row is reused");

    let findings = list_findings_for_job(&pool, job.id)
        .await
        .expect("list findings");
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].structured_json["total_crimes"], 11);
    assert_eq!(
        findings[0].payload().expect("payload"),
        crime_summary(11)
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn upsert_for_unknown_source_fails_without_writing(pool: sqlx::PgPool) {
    let job = create_job(&pool, &new_job("org-a", "SW1A 2AA"))
        .await
        .expect("create_job failed");

    let err = upsert_finding(
        &pool,
        job.id,
        "NOT_A_SOURCE",
        FindingStatus::Complete,
        &crime_summary(1),
        Utc::now(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, DbError::Sqlx(_)));

    let findings = list_findings_for_job(&pool, job.id).await.expect("list");
    assert!(findings.is_empty());
}

// ---------------------------------------------------------------------------
// Section 3: Rate limits
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn limit_calls_pass_then_next_is_refused_until_window_elapses(pool: sqlx::PgPool) {
    let policy = RateLimitPolicy::from_secs(5, 3600);
    let start = Utc.with_ymd_and_hms(2025, 10, 1, 12, 0, 0).unwrap();

    for expected in 1..=5u32 {
        let at = start + TimeDelta::minutes(i64::from(expected));
        let admission = check_and_consume(&pool, "actor-1", "geocode", &policy, at)
            .await
            .expect("check_and_consume");
        assert_eq!(admission, Admission::Allowed { used: expected });
    }

    let refused = check_and_consume(
        &pool,
        "actor-1",
        "geocode",
        &policy,
        start + TimeDelta::minutes(30),
    )
    .await
    .expect("check_and_consume");
    assert_eq!(refused, Admission::RateLimited);

    // A refusal must not touch the counter.
    let (count, started): (i32, chrono::DateTime<Utc>) = sqlx::query_as(
        "SELECT count, window_started_at FROM rate_limits WHERE actor_id = 'actor-1' AND action = 'geocode'",
    )
    .fetch_one(&pool)
    .await
    .expect("counter row");
    assert_eq!(count, 5);
    assert_eq!(started, start + TimeDelta::minutes(1));

    let after_window = check_and_consume(
        &pool,
        "actor-1",
        "geocode",
        &policy,
        start + TimeDelta::minutes(61),
    )
    .await
    .expect("check_and_consume");
    assert_eq!(after_window, Admission::Allowed { used: 1 });
}

#[sqlx::test(migrations = "../../migrations")]
async fn counters_are_keyed_by_actor_and_action(pool: sqlx::PgPool) {
    let policy = RateLimitPolicy::from_secs(1, 3600);
    let now = Utc::now();

    assert!(check_and_consume(&pool, "actor-1", "geocode", &policy, now)
        .await
        .expect("first")
        .is_allowed());
    assert!(!check_and_consume(&pool, "actor-1", "geocode", &policy, now)
        .await
        .expect("second")
        .is_allowed());
    assert!(check_and_consume(&pool, "actor-1", "epc_check", &policy, now)
        .await
        .expect("other action")
        .is_allowed());
    assert!(check_and_consume(&pool, "actor-2", "geocode", &policy, now)
        .await
        .expect("other actor")
        .is_allowed());
}

#[sqlx::test(migrations = "../../migrations")]
async fn concurrent_calls_never_exceed_limit(pool: sqlx::PgPool) {
    let policy = RateLimitPolicy::from_secs(5, 3600);
    let now = Utc::now();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            check_and_consume(&pool, "actor-1", "crime_summary", &policy, now).await
        }));
    }

    let mut allowed = 0;
    for handle in handles {
        if handle.await.expect("join").expect("query").is_allowed() {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 5);
}

// ---------------------------------------------------------------------------
// Section 4: Catalog
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn sources_filter_by_job_type(pool: sqlx::PgPool) {
    sqlx::query(
        "INSERT INTO sources (slug, name, category, mode, url, enabled_for) VALUES \
         ('RADON_UK', 'UK Radon Maps', 'INDICATIVE', 'ASSISTED', 'https://www.ukradon.org/', '{}')",
    )
    .execute(&pool)
    .await
    .expect("insert source");

    let all = list_sources(&pool, None).await.expect("all sources");
    let development = list_sources(&pool, Some(JobType::Development))
        .await
        .expect("development sources");

    assert!(all.iter().any(|s| s.slug == "EPC_OPEN_DATA_API"));
    assert!(development.len() < all.len());
    assert!(development.iter().all(|s| s.applies_to(JobType::Development)));
    assert!(!development.iter().any(|s| s.slug == "POLICE_CRIME"));
    assert!(development.iter().any(|s| s.slug == "RADON_UK"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn portals_are_scoped_to_org(pool: sqlx::PgPool) {
    sqlx::query(
        "INSERT INTO portal_configs (org_id, label, authority_name, url) VALUES \
         ('org-a', 'Westminster planning', 'Westminster City Council', 'https://idoxpa.westminster.gov.uk/'), \
         ('org-b', 'Leeds planning', 'Leeds City Council', 'https://publicaccess.leeds.gov.uk/')",
    )
    .execute(&pool)
    .await
    .expect("insert portals");

    let portals = list_portals_for_org(&pool, "org-a").await.expect("portals");
    assert_eq!(portals.len(), 1);
    assert_eq!(portals[0].label, "Westminster planning");
}
