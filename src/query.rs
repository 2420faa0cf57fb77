//! Selection trees handed to the executor.
//!
//! A [`QueryShape`] is built from a parsed document with variables already
//! substituted and fragments flattened, so execution never looks at query text.
//! Fields answering under the same response key are merged into one.

use std::collections::HashMap;

use async_graphql::parser::Positioned;
use async_graphql::parser::types::{
    DocumentOperations, ExecutableDocument, FragmentDefinition, OperationDefinition,
    OperationType, Selection, SelectionSet,
};
use async_graphql_value::{ConstValue, Name};
use indexmap::IndexMap;

use crate::error::RequestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSelection {
    pub name: String,
    pub alias: Option<String>,
    pub arguments: IndexMap<Name, ConstValue>,
    pub selections: Vec<FieldSelection>,
}

impl FieldSelection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            arguments: IndexMap::new(),
            selections: Vec::new(),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn arg(mut self, name: &str, value: ConstValue) -> Self {
        self.arguments.insert(Name::new(name), value);
        self
    }

    pub fn select(mut self, selection: FieldSelection) -> Self {
        self.selections.push(selection);
        self
    }

    /// Key of this field in the result object.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryShape {
    pub operation: OperationKind,
    pub selections: Vec<FieldSelection>,
}

impl QueryShape {
    pub fn query(selections: Vec<FieldSelection>) -> Self {
        Self {
            operation: OperationKind::Query,
            selections,
        }
    }

    pub fn mutation(selections: Vec<FieldSelection>) -> Self {
        Self {
            operation: OperationKind::Mutation,
            selections,
        }
    }

    /// Parses `source` and lowers the chosen operation into a selection tree.
    pub fn parse(
        source: &str,
        operation_name: Option<&str>,
        variables: &HashMap<String, ConstValue>,
    ) -> Result<Self, RequestError> {
        let document = async_graphql::parser::parse_query(source).map_err(|e| {
            RequestError::Parse {
                message: e.to_string(),
            }
        })?;
        Self::from_document(document, operation_name, variables)
    }

    pub fn from_document(
        document: ExecutableDocument,
        operation_name: Option<&str>,
        variables: &HashMap<String, ConstValue>,
    ) -> Result<Self, RequestError> {
        let operation = select_operation(&document.operations, operation_name)?;

        let operation_kind = match operation.ty {
            OperationType::Query => OperationKind::Query,
            OperationType::Mutation => OperationKind::Mutation,
            OperationType::Subscription => return Err(RequestError::UnsupportedOperation),
        };

        let mut bound = HashMap::with_capacity(operation.variable_definitions.len());
        for definition in &operation.variable_definitions {
            let name = definition.node.name.node.as_str();
            let value = variables
                .get(name)
                .cloned()
                .or_else(|| definition.node.default_value.as_ref().map(|v| v.node.clone()))
                .unwrap_or(ConstValue::Null);
            bound.insert(name.to_string(), value);
        }

        let mut lowering = Lowering {
            fragments: &document.fragments,
            variables: &bound,
            expanding: Vec::new(),
        };
        let mut selections = Vec::new();
        lowering.lower(&operation.selection_set.node, &mut selections)?;

        Ok(Self {
            operation: operation_kind,
            selections,
        })
    }
}

fn select_operation<'d>(
    operations: &'d DocumentOperations,
    operation_name: Option<&str>,
) -> Result<&'d OperationDefinition, RequestError> {
    match (operations, operation_name) {
        (DocumentOperations::Single(op), None) => Ok(&op.node),
        (DocumentOperations::Single(_), Some(name)) => Err(RequestError::UnknownOperation {
            name: name.to_string(),
        }),
        (DocumentOperations::Multiple(ops), Some(name)) => ops
            .get(name)
            .map(|op| &op.node)
            .ok_or_else(|| RequestError::UnknownOperation {
                name: name.to_string(),
            }),
        (DocumentOperations::Multiple(ops), None) if ops.len() == 1 => ops
            .values()
            .next()
            .map(|op| &op.node)
            .ok_or(RequestError::OperationNameRequired),
        (DocumentOperations::Multiple(_), None) => Err(RequestError::OperationNameRequired),
    }
}

struct Lowering<'d> {
    fragments: &'d HashMap<Name, Positioned<FragmentDefinition>>,
    variables: &'d HashMap<String, ConstValue>,
    /// Fragments whose selections are currently being lowered.
    expanding: Vec<Name>,
}

impl Lowering<'_> {
    fn lower(
        &mut self,
        set: &SelectionSet,
        out: &mut Vec<FieldSelection>,
    ) -> Result<(), RequestError> {
        let variables = self.variables;
        for item in &set.items {
            match &item.node {
                Selection::Field(field) => {
                    let field = &field.node;
                    let mut arguments = IndexMap::with_capacity(field.arguments.len());
                    for (name, value) in &field.arguments {
                        let value = value.node.clone().into_const_with(|var| {
                            Ok::<_, RequestError>(
                                variables
                                    .get(var.as_str())
                                    .cloned()
                                    .unwrap_or(ConstValue::Null),
                            )
                        })?;
                        arguments.insert(name.node.clone(), value);
                    }

                    let mut selections = Vec::new();
                    self.lower(&field.selection_set.node, &mut selections)?;

                    merge_into(
                        out,
                        FieldSelection {
                            name: field.name.node.to_string(),
                            alias: field.alias.as_ref().map(|a| a.node.to_string()),
                            arguments,
                            selections,
                        },
                    );
                }
                Selection::FragmentSpread(spread) => {
                    let name = &spread.node.fragment_name.node;
                    let fragments = self.fragments;
                    let fragment = fragments.get(name).ok_or_else(|| {
                        RequestError::UnknownFragment {
                            name: name.to_string(),
                        }
                    })?;
                    if self.expanding.contains(name) {
                        return Err(RequestError::FragmentCycle {
                            name: name.to_string(),
                        });
                    }

                    self.expanding.push(name.clone());
                    self.lower(&fragment.node.selection_set.node, out)?;
                    self.expanding.pop();
                }
                Selection::InlineFragment(fragment) => {
                    self.lower(&fragment.node.selection_set.node, out)?;
                }
            }
        }
        Ok(())
    }
}

/// Adds `selection` to `out`, folding it into an earlier field that answers
/// under the same response key.
fn merge_into(out: &mut Vec<FieldSelection>, selection: FieldSelection) {
    match out
        .iter_mut()
        .find(|existing| existing.response_key() == selection.response_key())
    {
        Some(existing) => {
            for child in selection.selections {
                merge_into(&mut existing.selections, child);
            }
        }
        None => out.push(selection),
    }
}
