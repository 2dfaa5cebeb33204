//! Shared test fixtures
//!
//! The course/lecture/student/video registry and seed data used by unit and
//! integration tests. The shape deliberately covers every relation kind:
//! plain hasOne (`Lecture.video`), filtered hasOne with and without cascade
//! (`Course.privateLecture`, `Course.lecture3`), readOnly sync
//! (`Course.lecture4`), hasMany (`Course.lectures`) and manyMany in both
//! directions (`Course.students`, `Student.enrolledCourses`).

use crate::config::OrmDefaults;
use crate::memory::MemoryStore;
use crate::registry::{ModelDef, Registry, RelationDef, SyncMode, ThroughSpec};
use crate::term::Predicate;
use serde_json::json;

/// Registry with the full course/lecture/student/video relation graph
pub fn course_registry() -> Registry {
    let mut registry = Registry::with_defaults(OrmDefaults { timestamps: true });

    registry.register(ModelDef::new("Video")).expect("Video");

    registry
        .register(
            ModelDef::new("Lecture")
                .relation("course", RelationDef::has_one("courseId", "Course"))
                .relation(
                    "video",
                    RelationDef::has_one("videoId", "Video").sync(SyncMode::Cascade),
                ),
        )
        .expect("Lecture");

    registry
        .register(
            ModelDef::new("Course")
                .relation("lectures", RelationDef::has_many("courseId", "Lecture"))
                .relation("videoLectures", RelationDef::has_many("courseId", "Lecture"))
                .relation(
                    "students",
                    RelationDef::many_many("courseId", "studentId", "Student")
                        .through(ThroughSpec::new("courses_students")),
                )
                .relation(
                    "lecture3",
                    RelationDef::has_one("courseId", "Lecture")
                        .filter(Predicate::fields([("title", json!("Lecture3"))])),
                )
                .relation(
                    "lecture4",
                    RelationDef::has_one("courseId", "Lecture")
                        .filter(Predicate::fields([("title", json!("Lecture4"))]))
                        .sync(SyncMode::ReadOnly),
                )
                .relation(
                    "privateLecture",
                    RelationDef::has_one("courseId", "Lecture")
                        .filter(Predicate::fields([("private", json!(true))]))
                        .sync(SyncMode::Cascade),
                )
                .relation(
                    "lectureSpecial",
                    RelationDef::has_one("courseId", "Lecture")
                        .filter(Predicate::fields([("title", json!("Lecture Special"))]))
                        .sync(SyncMode::Cascade),
                ),
        )
        .expect("Course");

    registry
        .register(
            ModelDef::new("Student").relation(
                "enrolledCourses",
                RelationDef::many_many("studentId", "courseId", "Course").through(
                    ThroughSpec::new("courses_students")
                        .filter(Predicate::fields([("enrolled", json!(true))])),
                ),
            ),
        )
        .expect("Student");

    registry
}

/// In-memory store seeded with two courses, four lectures, four videos,
/// four students and the enrollment join rows
pub fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();

    store.seed(
        "courses",
        vec![
            json!({"id": "c1", "title": "Course1"}),
            json!({"id": "c2", "title": "Course2"}),
        ],
    );
    store.seed(
        "videos",
        vec![
            json!({"id": "v1", "url": "dir/video1.mp4"}),
            json!({"id": "v2", "url": "dir/video2.mp4"}),
            json!({"id": "v3", "url": "dir/video3.mp4"}),
            json!({"id": "v4", "url": "dir/video4.mp4"}),
        ],
    );
    store.seed(
        "lectures",
        vec![
            json!({"id": "l1", "title": "Lecture1", "courseId": "c1", "videoId": "v1", "private": false}),
            json!({"id": "l2", "title": "Lecture2", "courseId": "c1", "videoId": "v2", "private": false}),
            json!({"id": "l3", "title": "Lecture3", "courseId": "c2", "videoId": "v3", "private": false}),
            json!({"id": "l4", "title": "Lecture4", "courseId": "c2", "videoId": null, "private": false}),
        ],
    );
    store.seed(
        "students",
        vec![
            json!({"id": "s1", "name": "Student1", "email": "student1@inst1.edu"}),
            json!({"id": "s2", "name": "Student2", "email": "student2@inst1.edu"}),
            json!({"id": "s3", "name": "Student3", "email": "student3@inst2.edu"}),
            json!({"id": "s4", "name": "Student4", "email": "student4@inst2.edu"}),
        ],
    );
    store.seed(
        "courses_students",
        vec![
            json!({"id": "cs1", "courseId": "c1", "studentId": "s1", "enrolled": true}),
            json!({"id": "cs2", "courseId": "c1", "studentId": "s2", "enrolled": false}),
            json!({"id": "cs3", "courseId": "c2", "studentId": "s2", "enrolled": true}),
            json!({"id": "cs4", "courseId": "c2", "studentId": "s3", "enrolled": false}),
            json!({"id": "cs5", "courseId": "c2", "studentId": "s4", "enrolled": true}),
        ],
    );

    store
}
