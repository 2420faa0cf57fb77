//! Immutable schema graph: object types, their fields, and field resolvers.
//!
//! A [`Schema`] is assembled once through [`SchemaBuilder`] and then only read,
//! so a single `Arc<Schema>` is shared by every in-flight request.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_graphql_value::{ConstValue, Name};
use indexmap::IndexMap;

use crate::context::Ctx;
use crate::error::{ResolveError, SchemaError};
use crate::loader::BoxFuture;
use crate::value::{kind_of, ToConstValue};

pub const INT: &str = "Int";
pub const FLOAT: &str = "Float";
pub const STRING: &str = "String";
pub const BOOLEAN: &str = "Boolean";
pub const ID: &str = "ID";

const SCALARS: [&str; 5] = [INT, FLOAT, STRING, BOOLEAN, ID];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Named(String),
    NonNull(Box<TypeRef>),
    List(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn named_nn(name: impl Into<String>) -> Self {
        Self::NonNull(Box::new(Self::named(name)))
    }

    pub fn named_list(name: impl Into<String>) -> Self {
        Self::List(Box::new(Self::named(name)))
    }

    pub fn named_nn_list_nn(name: impl Into<String>) -> Self {
        Self::NonNull(Box::new(Self::List(Box::new(Self::named_nn(name)))))
    }

    /// The innermost named type.
    pub fn base_name(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::NonNull(inner) | Self::List(inner) => inner.base_name(),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "{}", name),
            Self::NonNull(inner) => write!(f, "{}!", inner),
            Self::List(inner) => write!(f, "[{}]", inner),
        }
    }
}

/// What a resolver hands back to the executor.
///
/// `Immediate` results complete their node during the current tick.
/// `Deferred` results join the tick's wait-set and complete once the future
/// resolves, typically after a loader dispatch.
pub enum Resolution {
    Immediate(Result<ConstValue, ResolveError>),
    Deferred(BoxFuture<'static, Result<ConstValue, ResolveError>>),
}

impl Resolution {
    pub fn value(value: impl ToConstValue) -> Self {
        Self::Immediate(Ok(value.to_const_value()))
    }

    pub fn null() -> Self {
        Self::Immediate(Ok(ConstValue::Null))
    }

    pub fn error(error: ResolveError) -> Self {
        Self::Immediate(Err(error))
    }

    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = Result<ConstValue, ResolveError>> + Send + 'static,
    {
        Self::Deferred(Box::pin(future))
    }
}

impl From<Result<ConstValue, ResolveError>> for Resolution {
    fn from(result: Result<ConstValue, ResolveError>) -> Self {
        Self::Immediate(result)
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate(result) => f.debug_tuple("Immediate").field(result).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

pub type ResolverFn = Arc<dyn Fn(&Ctx<'_>) -> Resolution + Send + Sync>;

#[derive(Debug, Clone)]
pub struct InputValue {
    pub name: String,
    pub ty: TypeRef,
    pub default: Option<ConstValue>,
}

impl InputValue {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
        }
    }

    pub fn default_value(mut self, value: ConstValue) -> Self {
        self.default = Some(value);
        self
    }
}

#[derive(Debug, Clone)]
pub struct InputObjectType {
    pub name: String,
    pub fields: IndexMap<String, InputValue>,
}

impl InputObjectType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
        }
    }

    pub fn field(mut self, field: InputValue) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }
}

#[derive(Clone)]
pub struct FieldDefinition {
    pub name: String,
    pub ty: TypeRef,
    pub arguments: IndexMap<String, InputValue>,
    pub resolver: ResolverFn,
}

impl FieldDefinition {
    pub fn new<F>(name: impl Into<String>, ty: TypeRef, resolver: F) -> Self
    where
        F: Fn(&Ctx<'_>) -> Resolution + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            ty,
            arguments: IndexMap::new(),
            resolver: Arc::new(resolver),
        }
    }

    /// A field read straight from the parent object under the same name.
    pub fn property(name: impl Into<String>, ty: TypeRef) -> Self {
        let name = name.into();
        let key = name.clone();
        Self::new(name, ty, move |ctx| {
            Resolution::value(ctx.parent_field(&key).cloned().unwrap_or(ConstValue::Null))
        })
    }

    pub fn argument(mut self, argument: InputValue) -> Self {
        self.arguments.insert(argument.name.clone(), argument);
        self
    }
}

impl fmt::Debug for FieldDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDefinition")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("arguments", &self.arguments)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct ObjectType {
    pub name: String,
    fields: IndexMap<String, FieldDefinition>,
    duplicates: Vec<String>,
}

impl ObjectType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
            duplicates: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDefinition) -> Self {
        if self.fields.contains_key(&field.name) {
            self.duplicates.push(field.name.clone());
        } else {
            self.fields.insert(field.name.clone(), field);
        }
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldDefinition> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.values()
    }
}

#[derive(Debug)]
pub struct Schema {
    types: IndexMap<String, ObjectType>,
    inputs: IndexMap<String, InputObjectType>,
    query: String,
    mutation: Option<String>,
}

impl Schema {
    pub fn build(query: impl Into<String>, mutation: Option<&str>) -> SchemaBuilder {
        SchemaBuilder {
            types: Vec::new(),
            inputs: Vec::new(),
            query: query.into(),
            mutation: mutation.map(str::to_string),
        }
    }

    pub fn query_type(&self) -> &str {
        &self.query
    }

    pub fn mutation_type(&self) -> Option<&str> {
        self.mutation.as_deref()
    }

    pub fn object(&self, name: &str) -> Option<&ObjectType> {
        self.types.get(name)
    }

    pub fn is_object(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn input(&self, name: &str) -> Option<&InputObjectType> {
        self.inputs.get(name)
    }

    pub fn resolve(&self, type_name: &str, field: &str) -> Result<&FieldDefinition, ResolveError> {
        self.types
            .get(type_name)
            .and_then(|ty| ty.get(field))
            .ok_or_else(|| ResolveError::UnknownField {
                type_name: type_name.to_string(),
                field: field.to_string(),
            })
    }

    /// Validates the supplied arguments against `field`'s declarations and
    /// fills in defaults.
    pub fn coerce_arguments(
        &self,
        field: &FieldDefinition,
        supplied: &IndexMap<Name, ConstValue>,
    ) -> Result<IndexMap<Name, ConstValue>, ResolveError> {
        if let Some(unknown) = supplied
            .keys()
            .find(|name| !field.arguments.contains_key(name.as_str()))
        {
            return Err(ResolveError::UnknownArgument {
                argument: unknown.to_string(),
            });
        }

        let mut coerced = IndexMap::with_capacity(field.arguments.len());
        for (name, def) in &field.arguments {
            let value = match supplied.get(name.as_str()) {
                Some(value) => value.clone(),
                None => match &def.default {
                    Some(default) => default.clone(),
                    None if matches!(def.ty, TypeRef::NonNull(_)) => {
                        return Err(mismatch(name, &def.ty, &ConstValue::Null))
                    }
                    None => continue,
                },
            };
            coerced.insert(Name::new(name), self.coerce_input(name, &def.ty, value)?);
        }
        Ok(coerced)
    }

    fn coerce_input(
        &self,
        argument: &str,
        ty: &TypeRef,
        value: ConstValue,
    ) -> Result<ConstValue, ResolveError> {
        match (ty, value) {
            (TypeRef::NonNull(_), ConstValue::Null) => {
                Err(mismatch(argument, ty, &ConstValue::Null))
            }
            (TypeRef::NonNull(inner), value) => self.coerce_input(argument, inner, value),
            (_, ConstValue::Null) => Ok(ConstValue::Null),
            (TypeRef::List(inner), ConstValue::List(items)) => items
                .into_iter()
                .map(|item| self.coerce_input(argument, inner, item))
                .collect::<Result<Vec<_>, _>>()
                .map(ConstValue::List),
            (TypeRef::List(inner), single) => self
                .coerce_input(argument, inner, single)
                .map(|item| ConstValue::List(vec![item])),
            (TypeRef::Named(name), value) => self.coerce_named(argument, ty, name, value),
        }
    }

    fn coerce_named(
        &self,
        argument: &str,
        ty: &TypeRef,
        name: &str,
        value: ConstValue,
    ) -> Result<ConstValue, ResolveError> {
        if let Some(input) = self.inputs.get(name) {
            return match value {
                ConstValue::Object(fields) => self.coerce_object(argument, input, fields),
                other => Err(mismatch(argument, ty, &other)),
            };
        }

        let accepted = match (name, &value) {
            (INT, ConstValue::Number(n)) => n.is_i64(),
            (FLOAT, ConstValue::Number(_)) => true,
            (STRING, ConstValue::String(_)) => true,
            (BOOLEAN, ConstValue::Boolean(_)) => true,
            (ID, ConstValue::String(_)) => true,
            (ID, ConstValue::Number(n)) => n.is_i64(),
            _ => false,
        };

        if accepted {
            Ok(value)
        } else {
            Err(mismatch(argument, ty, &value))
        }
    }

    fn coerce_object(
        &self,
        argument: &str,
        input: &InputObjectType,
        mut supplied: IndexMap<Name, ConstValue>,
    ) -> Result<ConstValue, ResolveError> {
        if let Some(unknown) = supplied
            .keys()
            .find(|name| !input.fields.contains_key(name.as_str()))
        {
            return Err(ResolveError::UnknownArgument {
                argument: format!("{}.{}", argument, unknown),
            });
        }

        let mut coerced = IndexMap::with_capacity(input.fields.len());
        for (name, def) in &input.fields {
            let path = format!("{}.{}", argument, name);
            let value = match supplied.swap_remove(name.as_str()) {
                Some(value) => value,
                None => match &def.default {
                    Some(default) => default.clone(),
                    None if matches!(def.ty, TypeRef::NonNull(_)) => {
                        return Err(mismatch(&path, &def.ty, &ConstValue::Null))
                    }
                    None => continue,
                },
            };
            coerced.insert(Name::new(name), self.coerce_input(&path, &def.ty, value)?);
        }
        Ok(ConstValue::Object(coerced))
    }
}

fn mismatch(argument: &str, expected: &TypeRef, found: &ConstValue) -> ResolveError {
    ResolveError::ArgumentTypeMismatch {
        argument: argument.to_string(),
        expected: expected.to_string(),
        found: kind_of(found).to_string(),
    }
}

pub struct SchemaBuilder {
    types: Vec<ObjectType>,
    inputs: Vec<InputObjectType>,
    query: String,
    mutation: Option<String>,
}

impl SchemaBuilder {
    pub fn register(mut self, object: ObjectType) -> Self {
        self.types.push(object);
        self
    }

    pub fn register_input(mut self, input: InputObjectType) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn finish(self) -> Result<Schema, SchemaError> {
        let mut types = IndexMap::with_capacity(self.types.len());
        for object in self.types {
            if let Some(field) = object.duplicates.first() {
                return Err(SchemaError::DuplicateField {
                    type_name: object.name.clone(),
                    field: field.clone(),
                });
            }
            if types.contains_key(&object.name) {
                return Err(SchemaError::DuplicateType {
                    type_name: object.name,
                });
            }
            types.insert(object.name.clone(), object);
        }

        let mut inputs = IndexMap::with_capacity(self.inputs.len());
        for input in self.inputs {
            if types.contains_key(&input.name) || inputs.contains_key(&input.name) {
                return Err(SchemaError::DuplicateType {
                    type_name: input.name,
                });
            }
            inputs.insert(input.name.clone(), input);
        }

        let schema = Schema {
            types,
            inputs,
            query: self.query,
            mutation: self.mutation,
        };
        schema.check_references()?;
        Ok(schema)
    }
}

impl Schema {
    fn check_references(&self) -> Result<(), SchemaError> {
        for root in std::iter::once(&self.query).chain(self.mutation.as_ref()) {
            if !self.types.contains_key(root) {
                return Err(SchemaError::MissingRootType {
                    type_name: root.clone(),
                });
            }
        }

        let is_output = |name: &str| SCALARS.contains(&name) || self.types.contains_key(name);
        let is_input = |name: &str| SCALARS.contains(&name) || self.inputs.contains_key(name);

        for object in self.types.values() {
            for field in object.fields() {
                let referrer = format!("{}.{}", object.name, field.name);
                if !is_output(field.ty.base_name()) {
                    return Err(unknown_type(&referrer, field.ty.base_name()));
                }
                for argument in field.arguments.values() {
                    if !is_input(argument.ty.base_name()) {
                        return Err(unknown_type(&referrer, argument.ty.base_name()));
                    }
                }
            }
        }

        for input in self.inputs.values() {
            for field in input.fields.values() {
                if !is_input(field.ty.base_name()) {
                    let referrer = format!("{}.{}", input.name, field.name);
                    return Err(unknown_type(&referrer, field.ty.base_name()));
                }
            }
        }

        Ok(())
    }
}

fn unknown_type(referrer: &str, referenced: &str) -> SchemaError {
    SchemaError::UnknownType {
        referrer: referrer.to_string(),
        referenced: referenced.to_string(),
    }
}
