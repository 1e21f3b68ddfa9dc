#![allow(dead_code)]

use docmap_core::{
    Document, Handle, Key, Mappable, Model, Plain, Reference, Schema, SchemaBuilder,
};
use once_cell::sync::Lazy;

pub fn doc(value: serde_json::Value) -> Document {
    value.as_object().cloned().expect("fixture must be a JSON object")
}

#[derive(Debug, Default)]
pub struct Author {
    pub id: Option<Key>,
    pub name: String,
    pub tags: Vec<String>,
}

impl Mappable for Author {
    fn schema() -> &'static Schema<Self> {
        static SCHEMA: Lazy<Schema<Author>> = Lazy::new(|| {
            SchemaBuilder::<Author>::model("Author")
                .attribute(
                    "name",
                    Plain::new("anonymous".to_string()),
                    |a| &a.name,
                    |a| &mut a.name,
                )
                .attribute("tags", Plain::new(Vec::new()), |a| &a.tags, |a| &mut a.tags)
                .build()
        });
        &SCHEMA
    }
}

impl Model for Author {
    fn id(&self) -> &Option<Key> {
        &self.id
    }

    fn id_mut(&mut self) -> &mut Option<Key> {
        &mut self.id
    }
}

#[derive(Debug, Default)]
pub struct Book {
    pub id: Option<Key>,
    pub title: String,
    pub author: Option<Handle<Author>>,
}

impl Mappable for Book {
    fn schema() -> &'static Schema<Self> {
        static SCHEMA: Lazy<Schema<Book>> = Lazy::new(|| {
            SchemaBuilder::<Book>::model("Book")
                .attribute(
                    "title",
                    Plain::new(String::new()),
                    |b| &b.title,
                    |b| &mut b.title,
                )
                .attribute(
                    "author",
                    Reference::<Author>::new(),
                    |b| &b.author,
                    |b| &mut b.author,
                )
                .build()
        });
        &SCHEMA
    }
}

impl Model for Book {
    fn id(&self) -> &Option<Key> {
        &self.id
    }

    fn id_mut(&mut self) -> &mut Option<Key> {
        &mut self.id
    }
}

/// Self-referencing model used for reference cycles.
#[derive(Debug, Default)]
pub struct Node {
    pub id: Option<Key>,
    pub label: String,
    pub next: Option<Handle<Node>>,
    pub weight: i64,
}

impl Mappable for Node {
    fn schema() -> &'static Schema<Self> {
        static SCHEMA: Lazy<Schema<Node>> = Lazy::new(|| {
            SchemaBuilder::<Node>::model("Node")
                .attribute(
                    "label",
                    Plain::new(String::new()),
                    |n| &n.label,
                    |n| &mut n.label,
                )
                .attribute(
                    "next",
                    Reference::<Node>::new(),
                    |n| &n.next,
                    |n| &mut n.next,
                )
                .attribute(
                    "weight",
                    Plain::new(0_i64),
                    |n| &n.weight,
                    |n| &mut n.weight,
                )
                .build()
        });
        &SCHEMA
    }
}

impl Model for Node {
    fn id(&self) -> &Option<Key> {
        &self.id
    }

    fn id_mut(&mut self) -> &mut Option<Key> {
        &mut self.id
    }
}

#[derive(Debug, Default)]
pub struct Person {
    pub id: Option<Key>,
    pub name: String,
    pub role: String,
}

impl Mappable for Person {
    fn schema() -> &'static Schema<Self> {
        static SCHEMA: Lazy<Schema<Person>> = Lazy::new(|| {
            SchemaBuilder::<Person>::model("Person")
                .attribute(
                    "name",
                    Plain::new(String::new()),
                    |p| &p.name,
                    |p| &mut p.name,
                )
                .attribute(
                    "role",
                    Plain::new("member".to_string()),
                    |p| &p.role,
                    |p| &mut p.role,
                )
                .build()
        });
        &SCHEMA
    }
}

impl Model for Person {
    fn id(&self) -> &Option<Key> {
        &self.id
    }

    fn id_mut(&mut self) -> &mut Option<Key> {
        &mut self.id
    }
}

/// Extends `Person`, overriding the `role` default.
#[derive(Debug, Default)]
pub struct Admin {
    pub person: Person,
    pub level: u8,
}

impl Mappable for Admin {
    fn schema() -> &'static Schema<Self> {
        static SCHEMA: Lazy<Schema<Admin>> = Lazy::new(|| {
            SchemaBuilder::<Admin>::extend(
                "Admin",
                Person::schema(),
                |a| &a.person,
                |a| &mut a.person,
            )
            .attribute(
                "role",
                Plain::new("admin".to_string()),
                |a| &a.person.role,
                |a| &mut a.person.role,
            )
            .attribute("level", Plain::new(1_u8), |a| &a.level, |a| &mut a.level)
            .build()
        });
        &SCHEMA
    }
}

impl Model for Admin {
    fn id(&self) -> &Option<Key> {
        &self.person.id
    }

    fn id_mut(&mut self) -> &mut Option<Key> {
        &mut self.person.id
    }
}

/// Model with an explicit table name and a compound key.
#[derive(Debug, Default)]
pub struct Goose {
    pub id: Option<Key>,
    pub honks: i64,
}

impl Mappable for Goose {
    fn schema() -> &'static Schema<Self> {
        static SCHEMA: Lazy<Schema<Goose>> = Lazy::new(|| {
            SchemaBuilder::<Goose>::model("Goose")
                .attribute("honks", Plain::new(0_i64), |g| &g.honks, |g| &mut g.honks)
                .plural("geese")
                .build()
        });
        &SCHEMA
    }
}

impl Model for Goose {
    fn id(&self) -> &Option<Key> {
        &self.id
    }

    fn id_mut(&mut self) -> &mut Option<Key> {
        &mut self.id
    }
}
