//! Shared test schema: members, clubs and memberships
//!
//! - member(id, firstName, lastName, administratorId → member.id, version)
//! - club(id, name unique)
//! - membership(id, memberId → member.id, clubId → club.id, status, version)
//!
//! Seed rows:
//! - members: 1 Jack Hill (no admin), 2 Jill Hill (admin 1), 3 Bob Gill (admin 2)
//! - clubs: 1 Chess, 2 Rowing
//! - memberships: 1 (Jack, Chess), 2 (Jack, Rowing), 3 (Jill, Chess)
//!
//! A second catalog adds note(memberId → member.id, body), a table with no
//! key candidate at all.

use crate::catalog::{SchemaCatalog, StoreTableSchema};
use crate::storage::{SqliteStore, StoreRegistry};

pub fn member_schema() -> StoreTableSchema {
    StoreTableSchema::new("member")
        .column("id", "integer")
        .column("firstName", "text")
        .column("lastName", "text")
        .column("administratorId", "integer")
        .column("version", "integer")
        .sequence("id", None)
        .primary_key("pk_member", &["id"])
        .foreign_key("fk_member_administrator", &[("administratorId", "member", "id")])
}

pub fn catalog() -> SchemaCatalog {
    let club = StoreTableSchema::new("club")
        .column("id", "integer")
        .column("name", "text")
        .sequence("id", None)
        .primary_key("pk_club", &["id"])
        .unique_key("uq_club_name", &["name"]);

    let membership = StoreTableSchema::new("membership")
        .column("id", "integer")
        .column("memberId", "integer")
        .column("clubId", "integer")
        .column("status", "text")
        .column("version", "integer")
        .sequence("id", None)
        .primary_key("pk_membership", &["id"])
        .foreign_key("fk_membership_member", &[("memberId", "member", "id")])
        .foreign_key("fk_membership_club", &[("clubId", "club", "id")]);

    SchemaCatalog::builder("main")
        .table("member", member_schema())
        .table("club", club)
        .table("membership", membership)
        .build()
        .unwrap()
}

pub const SEED: &str = r#"
INSERT INTO member (id, firstName, lastName, administratorId, version) VALUES
    (1, 'Jack', 'Hill', NULL, 1),
    (2, 'Jill', 'Hill', 1, 1),
    (3, 'Bob', 'Gill', 2, 1);
INSERT INTO club (id, name) VALUES (1, 'Chess'), (2, 'Rowing');
INSERT INTO membership (id, memberId, clubId, status, version) VALUES
    (1, 1, 1, 'active', 1),
    (2, 1, 2, 'active', 1),
    (3, 2, 1, 'lapsed', 1);
"#;

/// In-memory store with the fixture tables created and seeded
pub fn store(catalog: &SchemaCatalog) -> SqliteStore {
    let store = SqliteStore::open_in_memory().unwrap();
    store.initialize_schema(catalog).unwrap();
    store.execute_batch(SEED).unwrap();
    store
}

pub fn stores(catalog: &SchemaCatalog) -> StoreRegistry {
    StoreRegistry::new().with(store(catalog))
}

pub fn notes_catalog() -> SchemaCatalog {
    let note = StoreTableSchema::new("note")
        .column("memberId", "integer")
        .column("body", "text")
        .foreign_key("fk_note_member", &[("memberId", "member", "id")]);

    SchemaCatalog::builder("main")
        .table("member", member_schema())
        .table("note", note)
        .build()
        .unwrap()
}

pub const NOTES_SEED: &str = r#"
INSERT INTO member (id, firstName, lastName, administratorId, version) VALUES
    (1, 'Jack', 'Hill', NULL, 1),
    (2, 'Jill', 'Hill', 1, 1);
INSERT INTO note (memberId, body) VALUES
    (1, 'renewal due'),
    (1, 'renewal due'),
    (1, 'paid'),
    (2, 'new');
"#;

pub fn notes_stores(catalog: &SchemaCatalog) -> StoreRegistry {
    let store = SqliteStore::open_in_memory().unwrap();
    store.initialize_schema(catalog).unwrap();
    store.execute_batch(NOTES_SEED).unwrap();
    StoreRegistry::new().with(store)
}
