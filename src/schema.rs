//! The declarative `Types`/`Properties` DSL used to describe
//! `PROPERTIES`. This is a passive description used for validation and
//! documentation, separate from the `Property`/`Relation` runtime
//! accessors a type also needs.

use std::collections::BTreeMap;

/// A scalar or composite type tag for a declared property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueType {
    String,
    Integer,
    Float,
    Bool,
    Enum(Vec<String>),
    List(Box<ValueType>),
    Tuple(Vec<ValueType>),
    Map(Box<ValueType>),
    Reference(String),
}

/// Cardinality of a declared relation: singular (`Class`) or plural
/// (`[Class]`, one-to-many).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Singular,
    Plural,
}

#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    pub name: String,
    pub value_type: ValueType,
}

#[derive(Debug, Clone)]
pub struct RelationDescriptor {
    pub name: String,
    pub target_type: String,
    pub cardinality: Cardinality,
}

/// The full schema declaration for a `StoredObject` implementation:
/// `PROPERTIES`, `RELATIONS`, `COMPUTED_PROPERTIES`, and `RESERVED`.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub properties: BTreeMap<String, PropertyDescriptor>,
    pub relations: BTreeMap<String, RelationDescriptor>,
    pub computed_properties: Vec<String>,
}

impl Schema {
    pub const RESERVED: [&'static str; 3] = ["type", "oid", "updates"];

    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn declares_property(&self, name: &str) -> bool {
        self.properties.contains_key(name) || self.computed_properties.iter().any(|c| c == name)
    }

    pub fn declares_relation(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    pub fn declares(&self, name: &str) -> bool {
        Self::RESERVED.contains(&name) || self.declares_property(name) || self.declares_relation(name)
    }
}

#[derive(Debug, Default)]
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    pub fn property(mut self, name: impl Into<String>, value_type: ValueType) -> Self {
        let name = name.into();
        self.schema.properties.insert(
            name.clone(),
            PropertyDescriptor { name, value_type },
        );
        self
    }

    pub fn relation(
        mut self,
        name: impl Into<String>,
        target_type: impl Into<String>,
        cardinality: Cardinality,
    ) -> Self {
        let name = name.into();
        self.schema.relations.insert(
            name.clone(),
            RelationDescriptor {
                name,
                target_type: target_type.into(),
                cardinality,
            },
        );
        self
    }

    pub fn computed(mut self, name: impl Into<String>) -> Self {
        self.schema.computed_properties.push(name.into());
        self
    }

    pub fn build(self) -> Schema {
        self.schema
    }
}
