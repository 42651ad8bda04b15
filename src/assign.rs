//! Pick-up/drop resolution for roster editing.
//!
//! A pick-up carries a typed identity; a drop target declares which kinds it
//! reacts to. Pairs with no mapping resolve to [`DropOutcome::Ignored`] without
//! touching the store.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::CoreResult;
use crate::roster;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Teacher,
    Student,
    Contact,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickedUp {
    pub kind: EntityKind,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "zone", rename_all = "camelCase")]
pub enum DropTarget {
    #[serde(rename_all = "camelCase")]
    TeacherRoster { class_id: String },
    #[serde(rename_all = "camelCase")]
    StudentRoster { class_id: String },
    #[serde(rename_all = "camelCase")]
    ClassCard { class_id: String },
}

impl DropTarget {
    pub fn class_id(&self) -> &str {
        match self {
            DropTarget::TeacherRoster { class_id }
            | DropTarget::StudentRoster { class_id }
            | DropTarget::ClassCard { class_id } => class_id,
        }
    }

    pub fn accepts(&self, kind: EntityKind) -> bool {
        matches!(
            (self, kind),
            (DropTarget::TeacherRoster { .. }, EntityKind::Teacher)
                | (DropTarget::TeacherRoster { .. }, EntityKind::Contact)
                | (DropTarget::StudentRoster { .. }, EntityKind::Student)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum DropOutcome {
    #[serde(rename_all = "camelCase")]
    TeacherAssigned {
        class_id: String,
        teacher_id: String,
        created: bool,
    },
    #[serde(rename_all = "camelCase")]
    StudentAssigned {
        class_id: String,
        student_id: String,
        created: bool,
    },
    #[serde(rename_all = "camelCase")]
    ContactPromoted {
        class_id: String,
        contact_id: String,
        teacher_id: String,
        reused_teacher: bool,
        created: bool,
    },
    Ignored,
}

impl DropOutcome {
    pub fn mutated(&self) -> bool {
        !matches!(self, DropOutcome::Ignored)
    }
}

pub fn resolve_drop(conn: &Connection, item: &PickedUp, target: &DropTarget) -> CoreResult<DropOutcome> {
    if !target.accepts(item.kind) {
        warn!(kind = ?item.kind, id = %item.id, target = ?target, "drop ignored");
        return Ok(DropOutcome::Ignored);
    }
    let class_id = target.class_id();
    match item.kind {
        EntityKind::Teacher => {
            let created = roster::assign_teacher(conn, class_id, &item.id)?;
            Ok(DropOutcome::TeacherAssigned {
                class_id: class_id.to_string(),
                teacher_id: item.id.clone(),
                created,
            })
        }
        EntityKind::Student => {
            let created = roster::assign_student(conn, class_id, &item.id)?;
            Ok(DropOutcome::StudentAssigned {
                class_id: class_id.to_string(),
                student_id: item.id.clone(),
                created,
            })
        }
        EntityKind::Contact => promote_contact(conn, class_id, &item.id),
    }
}

/// Materializes a teacher from a directory contact (or reuses the one already
/// linked to it) and assigns it to the class in one transaction.
pub fn promote_contact(conn: &Connection, class_id: &str, contact_id: &str) -> CoreResult<DropOutcome> {
    let tx = conn.unchecked_transaction()?;
    crate::db::require_class(&tx, class_id)?;
    let contact = roster::get_contact(&tx, contact_id)?;

    let (teacher_id, reused_teacher) = match roster::find_teacher_by_contact(&tx, contact_id)? {
        Some(existing) => (existing.id, true),
        None => {
            let teacher_id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO teachers(id, full_name, photo_url, linked_contact_id, email, phone)
                 VALUES(?, ?, ?, ?, ?, ?)",
                (
                    &teacher_id,
                    &contact.full_name,
                    &contact.photo_url,
                    &contact.id,
                    &contact.email,
                    &contact.phone,
                ),
            )?;
            info!(contact_id, teacher_id = %teacher_id, "contact promoted to teacher");
            (teacher_id, false)
        }
    };
    let created = roster::assign_teacher(&tx, class_id, &teacher_id)?;
    tx.commit()?;

    Ok(DropOutcome::ContactPromoted {
        class_id: class_id.to_string(),
        contact_id: contact_id.to_string(),
        teacher_id,
        reused_teacher,
        created,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_conn;
    use crate::roster::{fixtures, load_roster};

    fn pick(kind: EntityKind, id: &str) -> PickedUp {
        PickedUp {
            kind,
            id: id.to_string(),
        }
    }

    fn teacher_zone(class_id: &str) -> DropTarget {
        DropTarget::TeacherRoster {
            class_id: class_id.to_string(),
        }
    }

    fn student_zone(class_id: &str) -> DropTarget {
        DropTarget::StudentRoster {
            class_id: class_id.to_string(),
        }
    }

    #[test]
    fn teacher_on_teacher_zone_assigns() {
        let conn = test_conn();
        fixtures::class(&conn, "c1", "K-1");
        fixtures::teacher(&conn, "t1", "Grace Park");
        let out = resolve_drop(&conn, &pick(EntityKind::Teacher, "t1"), &teacher_zone("c1"))
            .expect("drop");
        assert!(matches!(out, DropOutcome::TeacherAssigned { created: true, .. }));
        assert_eq!(load_roster(&conn).expect("roster").teacher_ids_for_class("c1"), vec!["t1"]);
    }

    #[test]
    fn unmapped_pairs_are_ignored_without_mutation() {
        let conn = test_conn();
        fixtures::class(&conn, "c1", "K-1");
        fixtures::teacher(&conn, "t1", "Grace Park");
        fixtures::student(&conn, "s1", "Ann Lee");
        fixtures::contact(&conn, "p1", "Ida Moss");

        let card = DropTarget::ClassCard {
            class_id: "c1".to_string(),
        };
        let cases = vec![
            (pick(EntityKind::Teacher, "t1"), student_zone("c1")),
            (pick(EntityKind::Student, "s1"), teacher_zone("c1")),
            (pick(EntityKind::Contact, "p1"), student_zone("c1")),
            (pick(EntityKind::Teacher, "t1"), card.clone()),
            (pick(EntityKind::Student, "s1"), card),
        ];
        for (item, target) in cases {
            let out = resolve_drop(&conn, &item, &target).expect("ignored drop");
            assert_eq!(out, DropOutcome::Ignored);
        }
        let roster = load_roster(&conn).expect("roster");
        assert!(roster.class_teacher_links.is_empty());
        assert!(roster.class_student_links.is_empty());
        assert_eq!(roster.teachers.len(), 1);
    }

    #[test]
    fn contact_drop_materializes_linked_teacher() {
        let conn = test_conn();
        fixtures::class(&conn, "c1", "K-1");
        fixtures::contact(&conn, "p1", "Ida Moss");

        let out = resolve_drop(&conn, &pick(EntityKind::Contact, "p1"), &teacher_zone("c1"))
            .expect("promote");
        let teacher_id = match &out {
            DropOutcome::ContactPromoted {
                teacher_id,
                reused_teacher,
                ..
            } => {
                assert!(!reused_teacher);
                teacher_id.clone()
            }
            other => panic!("expected promotion, got {:?}", other),
        };

        let roster = load_roster(&conn).expect("roster");
        let t = roster
            .teachers
            .iter()
            .find(|t| t.id == teacher_id)
            .expect("new teacher");
        assert_eq!(t.full_name, "Ida Moss");
        assert_eq!(t.linked_contact_id.as_deref(), Some("p1"));
        assert_eq!(t.email.as_deref(), Some("c@example.org"));
        assert_eq!(t.phone.as_deref(), Some("555-0199"));
        assert_eq!(t.photo_url.as_deref(), Some("https://img/p.png"));
        assert_eq!(roster.teacher_ids_for_class("c1"), vec![teacher_id.as_str()]);
    }

    #[test]
    fn second_contact_drop_reuses_teacher() {
        let conn = test_conn();
        fixtures::class(&conn, "c1", "K-1");
        fixtures::class(&conn, "c2", "K-2");
        fixtures::contact(&conn, "p1", "Ida Moss");
        resolve_drop(&conn, &pick(EntityKind::Contact, "p1"), &teacher_zone("c1")).expect("first");
        let out = resolve_drop(&conn, &pick(EntityKind::Contact, "p1"), &teacher_zone("c2"))
            .expect("second");
        assert!(matches!(
            out,
            DropOutcome::ContactPromoted {
                reused_teacher: true,
                created: true,
                ..
            }
        ));
        assert_eq!(load_roster(&conn).expect("roster").teachers.len(), 1);
    }

    #[test]
    fn failed_promotion_leaves_no_teacher_behind() {
        let conn = test_conn();
        fixtures::contact(&conn, "p1", "Ida Moss");
        let e = resolve_drop(&conn, &pick(EntityKind::Contact, "p1"), &teacher_zone("missing"))
            .expect_err("missing class");
        assert_eq!(e.code(), "not_found");
        assert!(load_roster(&conn).expect("roster").teachers.is_empty());
    }

    #[test]
    fn drop_target_parses_from_wire_shape() {
        let t: DropTarget =
            serde_json::from_value(serde_json::json!({ "zone": "studentRoster", "classId": "c1" }))
                .expect("parse target");
        assert_eq!(t, student_zone("c1"));
        assert!(t.accepts(EntityKind::Student));
        assert!(!t.accepts(EntityKind::Contact));
    }
}
