//! Cascading write scenarios: create and update with embedded relation payloads

use serde_json::json;
use std::sync::Arc;
use tidepool::tests_cfg::{course_registry, seeded_store};
use tidepool::{
    Criteria, Datum, MemoryStore, Orm, Predicate, QueryOptions, Term, TideError, TideExecutor,
    WriteOptions,
};

fn orm() -> Orm<MemoryStore> {
    Orm::new(Arc::new(course_registry()), seeded_store())
}

#[test]
fn test_create_cascades_new_has_one_payloads() {
    let orm = orm();
    let course = orm
        .model("Course")
        .unwrap()
        .create(
            json!({
                "title": "Course3",
                "privateLecture": {"title": "Lecture5", "videoId": null, "private": true},
                "lectureSpecial": {"title": "Lecture Special", "video": {"url": "dir/video5.mp4"}},
            }),
            &WriteOptions::default(),
        )
        .unwrap()
        .unwrap();

    // the result is re-read with the relations materialized
    assert_eq!(course["privateLecture"]["private"], true);
    assert!(course["privateLecture"].get("createTime").is_some());
    assert_eq!(course["lectureSpecial"]["title"], "Lecture Special");
    assert_eq!(course["lectureSpecial"]["video"]["url"], "dir/video5.mp4");

    // the stored parent row carries no embedded relation data
    let stored = orm
        .model("Course")
        .unwrap()
        .find(
            &Criteria::Key(course["id"].clone()),
            &QueryOptions::default(),
        )
        .unwrap()
        .unwrap();
    assert!(stored.get("privateLecture").is_none());
    assert!(stored.get("lectureSpecial").is_none());

    // the dependent rows point back at the parent
    let private = orm
        .model("Lecture")
        .unwrap()
        .find(
            &Criteria::Match(Predicate::fields([("private", json!(true))])),
            &QueryOptions::default(),
        )
        .unwrap()
        .unwrap();
    assert_eq!(private["courseId"], course["id"]);

    // the nested video was written and linked from its lecture
    let special = orm
        .model("Lecture")
        .unwrap()
        .find(
            &Criteria::Match(Predicate::fields([("title", json!("Lecture Special"))])),
            &QueryOptions::default(),
        )
        .unwrap()
        .unwrap();
    let video = orm.executor().dump("videos");
    let written = video.iter().find(|v| v["url"] == "dir/video5.mp4").unwrap();
    assert_eq!(special["videoId"], written["id"]);
}

#[test]
fn test_create_with_existing_payload_updates_and_can_lapse_the_filter() {
    let orm = orm();
    let handle = orm.model("Course").unwrap();

    let first = handle
        .create(
            json!({
                "title": "Course3",
                "privateLecture": {"title": "Lecture5", "private": true},
            }),
            &WriteOptions::default(),
        )
        .unwrap()
        .unwrap();
    let mut private = first["privateLecture"].clone();

    // reuse the written lecture but break the relation's filter criteria
    private["title"] = json!("Updated Private Lecture");
    private["private"] = json!(false);
    let second = handle
        .create(
            json!({"title": "Course4", "privateLecture": private}),
            &WriteOptions::default(),
        )
        .unwrap()
        .unwrap();

    // the re-read relation no longer matches: present, explicitly null
    assert!(second.get("privateLecture").is_some());
    assert!(second["privateLecture"].is_null());

    // the existing row was updated in place, not duplicated
    let lectures = orm.executor().dump("lectures");
    let updated = lectures
        .iter()
        .find(|row| row["title"] == "Updated Private Lecture")
        .unwrap();
    assert_eq!(updated["id"], first["privateLecture"]["id"]);
    assert_eq!(updated["private"], false);
    assert!(updated.get("updateTime").is_some());
    assert_eq!(
        lectures
            .iter()
            .filter(|row| row["title"].as_str().is_some_and(|t| t.contains("Private")))
            .count(),
        1
    );
}

#[test]
fn test_read_only_payload_is_never_written_but_still_reread() {
    let orm = orm();
    // course c2 owns the lecture titled Lecture4 via the readOnly relation
    let course = orm
        .model("Course")
        .unwrap()
        .update(
            json!({
                "id": "c2",
                "title": "Course2",
                "lecture4": {"title": "Lecture4 changed"},
            }),
            &Criteria::key("c2"),
            &WriteOptions::default(),
        )
        .unwrap()
        .unwrap();

    // the embedded change was discarded; the re-read shows the stored row
    assert_eq!(course["lecture4"]["title"], "Lecture4");
    let lectures = orm.executor().dump("lectures");
    assert!(lectures.iter().all(|row| row["title"] != "Lecture4 changed"));
}

#[test]
fn test_update_cascades_existing_has_one_payloads() {
    let orm = orm();
    let handle = orm.model("Course").unwrap();

    let created = handle
        .create(
            json!({
                "title": "Course3",
                "privateLecture": {"title": "Lecture5", "private": true},
            }),
            &WriteOptions::default(),
        )
        .unwrap()
        .unwrap();

    let mut body = created.clone();
    body["privateLecture"]["title"] = json!("Lecture6");
    let updated = handle
        .update(
            body,
            &Criteria::Key(created["id"].clone()),
            &WriteOptions::default(),
        )
        .unwrap()
        .unwrap();

    assert_eq!(updated["privateLecture"]["title"], "Lecture6");
    assert_eq!(updated["privateLecture"]["id"], created["privateLecture"]["id"]);
    assert!(updated.get("updateTime").is_some());
}

#[test]
fn test_update_by_criteria_targets_the_first_match_by_key_order() {
    let orm = orm();
    let updated = orm
        .model("Lecture")
        .unwrap()
        .update(
            json!({"reviewed": true}),
            &Criteria::Match(Predicate::fields([("courseId", json!("c1"))])),
            &WriteOptions::default(),
        )
        .unwrap()
        .unwrap();

    // l1 sorts first; l2 is untouched
    assert_eq!(updated["id"], "l1");
    assert_eq!(updated["reviewed"], true);
    let lectures = orm.executor().dump("lectures");
    let untouched = lectures.iter().find(|row| row["id"] == "l2").unwrap();
    assert!(untouched.get("reviewed").is_none());
}

#[test]
fn test_update_without_return_changes_touches_every_match() {
    let orm = orm();
    let echoed = orm
        .model("Student")
        .unwrap()
        .update(
            json!({"grade": 0}),
            &Criteria::Match(Predicate::matches("email", "inst1\\.edu")),
            &WriteOptions {
                return_changes: false,
                ..Default::default()
            },
        )
        .unwrap()
        .unwrap();
    assert_eq!(echoed["grade"], 0);

    let graded = orm
        .model("Student")
        .unwrap()
        .find_all(
            &Criteria::Match(Predicate::matches("email", "inst1\\.edu")),
            &QueryOptions::default(),
        )
        .unwrap();
    assert_eq!(graded.len(), 2);
    assert!(graded.iter().all(|student| student["grade"] == 0));
}

#[test]
fn test_delete_by_criteria_and_exists() {
    let orm = orm();
    let handle = orm.model("Lecture").unwrap();

    let summary = handle
        .delete(&Criteria::Match(Predicate::fields([(
            "courseId",
            json!("c1"),
        )])))
        .unwrap();
    assert_eq!(summary.deleted, 2);
    assert!(!handle
        .exists(&Criteria::Match(Predicate::fields([(
            "courseId",
            json!("c1")
        )])))
        .unwrap());
    assert!(handle.exists(&Criteria::key("l3")).unwrap());
}

/// Fails any insert into the lectures collection, passes everything else on
struct FlakyStore {
    inner: MemoryStore,
}

impl TideExecutor for FlakyStore {
    fn run(&self, query: &Term) -> Result<Datum, TideError> {
        if let Term::Insert { source, .. } = query {
            if matches!(source.as_ref(), Term::Table(name) if name == "lectures") {
                return Err(TideError::Transport("simulated outage".to_string()));
            }
        }
        self.inner.run(query)
    }
}

#[test]
fn test_cascade_failure_aborts_without_rolling_back() {
    let orm = Orm::new(
        Arc::new(course_registry()),
        FlakyStore {
            inner: seeded_store(),
        },
    );

    let err = orm
        .model("Course")
        .unwrap()
        .create(
            json!({
                "title": "Course3",
                "privateLecture": {"title": "Lecture5", "private": true},
            }),
            &WriteOptions::default(),
        )
        .unwrap_err();

    match err {
        TideError::CascadeStep { relation, source } => {
            assert_eq!(relation, "privateLecture");
            assert!(matches!(*source, TideError::Transport(_)));
        }
        other => panic!("unexpected error: {other}"),
    }

    // the parent insert is not rolled back
    let courses = orm.executor().inner.dump("courses");
    assert!(courses.iter().any(|row| row["title"] == "Course3"));
}
