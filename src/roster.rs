use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::{debug, info};

use crate::db;
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: String,
    pub full_name: String,
    pub photo_url: Option<String>,
    pub linked_contact_id: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub full_name: String,
    pub photo_url: Option<String>,
    pub date_of_birth: String,
    pub guardian_name: String,
    pub guardian_phone: String,
}

/// A directory entry that can be promoted into a teacher.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub full_name: String,
    pub photo_url: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassTeacherLink {
    pub class_id: String,
    pub teacher_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassStudentLink {
    pub class_id: String,
    pub student_id: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Roster {
    pub classes: Vec<Class>,
    pub teachers: Vec<Teacher>,
    pub students: Vec<Student>,
    pub class_teacher_links: Vec<ClassTeacherLink>,
    pub class_student_links: Vec<ClassStudentLink>,
}

/// One class with its linked teachers and students resolved.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRoster {
    pub class: Class,
    pub teachers: Vec<Teacher>,
    pub students: Vec<Student>,
}

// Derived lookups are recomputed from the link tables on every call.
impl Roster {
    pub fn class(&self, class_id: &str) -> Option<&Class> {
        self.classes.iter().find(|c| c.id == class_id)
    }

    pub fn teacher_ids_for_class(&self, class_id: &str) -> Vec<&str> {
        self.class_teacher_links
            .iter()
            .filter(|l| l.class_id == class_id)
            .map(|l| l.teacher_id.as_str())
            .collect()
    }

    pub fn student_ids_for_class(&self, class_id: &str) -> Vec<&str> {
        self.class_student_links
            .iter()
            .filter(|l| l.class_id == class_id)
            .map(|l| l.student_id.as_str())
            .collect()
    }

    pub fn teachers_for_class(&self, class_id: &str) -> Vec<Teacher> {
        let ids = self.teacher_ids_for_class(class_id);
        self.teachers
            .iter()
            .filter(|t| ids.contains(&t.id.as_str()))
            .cloned()
            .collect()
    }

    pub fn students_for_class(&self, class_id: &str) -> Vec<Student> {
        let ids = self.student_ids_for_class(class_id);
        self.students
            .iter()
            .filter(|s| ids.contains(&s.id.as_str()))
            .cloned()
            .collect()
    }

    /// Students not linked to any class.
    pub fn unassigned_students(&self) -> Vec<&Student> {
        self.students
            .iter()
            .filter(|s| !self.class_student_links.iter().any(|l| l.student_id == s.id))
            .collect()
    }

    pub fn class_roster(&self, class_id: &str) -> Option<ClassRoster> {
        let class = self.class(class_id)?.clone();
        Some(ClassRoster {
            class,
            teachers: self.teachers_for_class(class_id),
            students: self.students_for_class(class_id),
        })
    }
}

fn class_from_row(r: &Row<'_>) -> rusqlite::Result<Class> {
    Ok(Class {
        id: r.get(0)?,
        name: r.get(1)?,
        description: r.get(2)?,
    })
}

fn teacher_from_row(r: &Row<'_>) -> rusqlite::Result<Teacher> {
    Ok(Teacher {
        id: r.get(0)?,
        full_name: r.get(1)?,
        photo_url: r.get(2)?,
        linked_contact_id: r.get(3)?,
        email: r.get(4)?,
        phone: r.get(5)?,
    })
}

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        full_name: r.get(1)?,
        photo_url: r.get(2)?,
        date_of_birth: r.get(3)?,
        guardian_name: r.get(4)?,
        guardian_phone: r.get(5)?,
    })
}

fn contact_from_row(r: &Row<'_>) -> rusqlite::Result<Contact> {
    Ok(Contact {
        id: r.get(0)?,
        full_name: r.get(1)?,
        photo_url: r.get(2)?,
        email: r.get(3)?,
        phone: r.get(4)?,
    })
}

pub fn list_classes(conn: &Connection) -> CoreResult<Vec<Class>> {
    let mut stmt = conn.prepare("SELECT id, name, description FROM classes ORDER BY name, id")?;
    let rows = stmt
        .query_map([], class_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows)
}

pub fn list_teachers(conn: &Connection) -> CoreResult<Vec<Teacher>> {
    let mut stmt = conn.prepare(
        "SELECT id, full_name, photo_url, linked_contact_id, email, phone
         FROM teachers
         ORDER BY full_name, id",
    )?;
    let rows = stmt
        .query_map([], teacher_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows)
}

pub fn list_students(conn: &Connection) -> CoreResult<Vec<Student>> {
    let mut stmt = conn.prepare(
        "SELECT id, full_name, photo_url, date_of_birth, guardian_name, guardian_phone
         FROM students
         ORDER BY full_name, id",
    )?;
    let rows = stmt
        .query_map([], student_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows)
}

pub fn list_contacts(conn: &Connection) -> CoreResult<Vec<Contact>> {
    let mut stmt = conn.prepare(
        "SELECT id, full_name, photo_url, email, phone FROM contacts ORDER BY full_name, id",
    )?;
    let rows = stmt
        .query_map([], contact_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows)
}

pub fn get_class(conn: &Connection, class_id: &str) -> CoreResult<Class> {
    conn.query_row(
        "SELECT id, name, description FROM classes WHERE id = ?",
        [class_id],
        class_from_row,
    )
    .optional()?
    .ok_or_else(|| CoreError::not_found("class", class_id))
}

pub fn get_contact(conn: &Connection, contact_id: &str) -> CoreResult<Contact> {
    conn.query_row(
        "SELECT id, full_name, photo_url, email, phone FROM contacts WHERE id = ?",
        [contact_id],
        contact_from_row,
    )
    .optional()?
    .ok_or_else(|| CoreError::not_found("contact", contact_id))
}

pub fn find_teacher_by_contact(conn: &Connection, contact_id: &str) -> CoreResult<Option<Teacher>> {
    Ok(conn
        .query_row(
            "SELECT id, full_name, photo_url, linked_contact_id, email, phone
             FROM teachers
             WHERE linked_contact_id = ?
             ORDER BY id
             LIMIT 1",
            [contact_id],
            teacher_from_row,
        )
        .optional()?)
}

fn list_teacher_links(conn: &Connection) -> CoreResult<Vec<ClassTeacherLink>> {
    let mut stmt =
        conn.prepare("SELECT class_id, teacher_id FROM class_teachers ORDER BY class_id, teacher_id")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(ClassTeacherLink {
                class_id: r.get(0)?,
                teacher_id: r.get(1)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows)
}

fn list_student_links(conn: &Connection) -> CoreResult<Vec<ClassStudentLink>> {
    let mut stmt =
        conn.prepare("SELECT class_id, student_id FROM class_students ORDER BY class_id, student_id")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(ClassStudentLink {
                class_id: r.get(0)?,
                student_id: r.get(1)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows)
}

pub fn load_roster(conn: &Connection) -> CoreResult<Roster> {
    let roster = Roster {
        classes: list_classes(conn)?,
        teachers: list_teachers(conn)?,
        students: list_students(conn)?,
        class_teacher_links: list_teacher_links(conn)?,
        class_student_links: list_student_links(conn)?,
    };
    debug!(
        classes = roster.classes.len(),
        teachers = roster.teachers.len(),
        students = roster.students.len(),
        "roster loaded"
    );
    Ok(roster)
}

/// Students linked to one class, ordered by name.
pub fn class_students(conn: &Connection, class_id: &str) -> CoreResult<Vec<Student>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.full_name, s.photo_url, s.date_of_birth, s.guardian_name, s.guardian_phone
         FROM students s
         JOIN class_students cs ON cs.student_id = s.id
         WHERE cs.class_id = ?
         ORDER BY s.full_name, s.id",
    )?;
    let rows = stmt
        .query_map([class_id], student_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows)
}

/// Returns `true` when a new link row was written; an existing pair is a no-op.
pub fn assign_teacher(conn: &Connection, class_id: &str, teacher_id: &str) -> CoreResult<bool> {
    db::require_class(conn, class_id)?;
    if !db::teacher_exists(conn, teacher_id)? {
        return Err(CoreError::not_found("teacher", teacher_id));
    }
    let n = conn.execute(
        "INSERT INTO class_teachers(class_id, teacher_id) VALUES(?, ?)
         ON CONFLICT(class_id, teacher_id) DO NOTHING",
        (class_id, teacher_id),
    )?;
    if n > 0 {
        info!(class_id, teacher_id, "teacher assigned");
    } else {
        debug!(class_id, teacher_id, "teacher already assigned");
    }
    Ok(n > 0)
}

/// Returns `true` when a new link row was written; an existing pair is a no-op.
pub fn assign_student(conn: &Connection, class_id: &str, student_id: &str) -> CoreResult<bool> {
    db::require_class(conn, class_id)?;
    if !db::student_exists(conn, student_id)? {
        return Err(CoreError::not_found("student", student_id));
    }
    let n = conn.execute(
        "INSERT INTO class_students(class_id, student_id) VALUES(?, ?)
         ON CONFLICT(class_id, student_id) DO NOTHING",
        (class_id, student_id),
    )?;
    if n > 0 {
        info!(class_id, student_id, "student assigned");
    } else {
        debug!(class_id, student_id, "student already assigned");
    }
    Ok(n > 0)
}

pub fn remove_teacher(conn: &Connection, class_id: &str, teacher_id: &str) -> CoreResult<bool> {
    let n = conn.execute(
        "DELETE FROM class_teachers WHERE class_id = ? AND teacher_id = ?",
        (class_id, teacher_id),
    )?;
    info!(class_id, teacher_id, removed = n > 0, "teacher unassigned");
    Ok(n > 0)
}

pub fn remove_student(conn: &Connection, class_id: &str, student_id: &str) -> CoreResult<bool> {
    let n = conn.execute(
        "DELETE FROM class_students WHERE class_id = ? AND student_id = ?",
        (class_id, student_id),
    )?;
    info!(class_id, student_id, removed = n > 0, "student unassigned");
    Ok(n > 0)
}
