//! Filter and ordering expressions over stored entities.
//!
//! Filters are written `field__lookup=value`; a bare `field=value` means a
//! case-insensitive substring match. Orderings are field names with an
//! optional leading `-` for descending order. Every field is checked against
//! the entity's columns before any SQL is built.

use std::fmt;
use std::str::FromStr;

use regex::Regex;

use crate::domain::ExperimentId;
use crate::error::CuffError;
use crate::record::{FieldType, Value};
use crate::schema::{Column, EXPERIMENT_ID, Entity, ROW_ID};

const LOOKUP_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Exact,
    IExact,
    IContains,
    In,
    Gt,
    Gte,
    Lt,
    Lte,
    IStartsWith,
    IEndsWith,
    Range,
    IsNull,
    IRegex,
}

impl Lookup {
    pub const ALL: [Lookup; 13] = [
        Lookup::Exact,
        Lookup::IExact,
        Lookup::IContains,
        Lookup::In,
        Lookup::Gt,
        Lookup::Gte,
        Lookup::Lt,
        Lookup::Lte,
        Lookup::IStartsWith,
        Lookup::IEndsWith,
        Lookup::Range,
        Lookup::IsNull,
        Lookup::IRegex,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Lookup::Exact => "exact",
            Lookup::IExact => "iexact",
            Lookup::IContains => "icontains",
            Lookup::In => "in",
            Lookup::Gt => "gt",
            Lookup::Gte => "gte",
            Lookup::Lt => "lt",
            Lookup::Lte => "lte",
            Lookup::IStartsWith => "istartswith",
            Lookup::IEndsWith => "iendswith",
            Lookup::Range => "range",
            Lookup::IsNull => "isnull",
            Lookup::IRegex => "iregex",
        }
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Lookup {
    type Err = CuffError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().to_ascii_lowercase();
        Lookup::ALL
            .into_iter()
            .find(|lookup| lookup.as_str() == wanted)
            .ok_or_else(|| CuffError::InvalidLookup(format!("unknown lookup `{value}`")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: String,
    pub lookup: Lookup,
    pub value: String,
}

impl Filter {
    pub fn new(field: impl Into<String>, lookup: Lookup, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            lookup,
            value: value.into(),
        }
    }

    /// Parses `field__lookup=value` or `field=value`.
    pub fn parse(expression: &str) -> Result<Self, CuffError> {
        let (target, value) = expression
            .split_once('=')
            .ok_or_else(|| CuffError::InvalidLookup(format!("`{expression}` has no `=`")))?;
        let target = target.trim();
        let (field, lookup) = match target.rsplit_once(LOOKUP_SEPARATOR) {
            Some((field, lookup)) => (field, lookup.parse()?),
            None => (target, Lookup::IContains),
        };
        if field.is_empty() {
            return Err(CuffError::InvalidLookup(format!(
                "`{expression}` names no field"
            )));
        }
        Ok(Self::new(field, lookup, value))
    }
}

impl FromStr for Filter {
    type Err = CuffError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Filter::parse(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ordering {
    pub field: String,
    pub descending: bool,
}

impl FromStr for Ordering {
    type Err = CuffError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        let (field, descending) = match value.strip_prefix('-') {
            Some(field) => (field, true),
            None => (value, false),
        };
        if field.is_empty() {
            return Err(CuffError::InvalidLookup("empty ordering".to_string()));
        }
        Ok(Self {
            field: field.to_string(),
            descending,
        })
    }
}

/// SQL text, positional parameters and the selected columns in order.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<Value>,
    pub columns: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub struct Query {
    entity: Entity,
    experiment: ExperimentId,
    filters: Vec<Filter>,
    ordering: Vec<Ordering>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Query {
    pub fn new(entity: Entity, experiment: ExperimentId) -> Self {
        Self {
            entity,
            experiment,
            filters: Vec::new(),
            ordering: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, ordering: Ordering) -> Self {
        self.ordering.push(ordering);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn entity(&self) -> Entity {
        self.entity
    }

    fn column(&self, field: &str) -> Result<Column, CuffError> {
        self.entity
            .column(field.trim())
            .ok_or_else(|| CuffError::UnknownField {
                entity: self.entity.to_string(),
                field: field.to_string(),
            })
    }

    pub fn compile(&self) -> Result<CompiledQuery, CuffError> {
        let columns: Vec<&'static str> = self
            .entity
            .columns()
            .iter()
            .map(|column| column.name)
            .collect();
        let owner = match self.entity {
            Entity::Experiment => ROW_ID,
            _ => EXPERIMENT_ID,
        };

        let mut conditions = vec![format!("{owner} = ?")];
        let mut params = vec![Value::Integer(self.experiment.get())];
        for filter in &self.filters {
            let column = self.column(&filter.field)?;
            conditions.push(condition(column, filter, &mut params)?);
        }

        let mut order = Vec::new();
        for ordering in &self.ordering {
            let column = self.column(&ordering.field)?;
            let direction = if ordering.descending { "DESC" } else { "ASC" };
            order.push(format!("{} {direction}", column.name));
        }
        if order.is_empty() {
            order.push(format!("{} ASC", self.entity.primary_key()));
        }

        let mut sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY {}",
            columns.join(", "),
            self.entity.table(),
            conditions.join(" AND "),
            order.join(", ")
        );
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }
        Ok(CompiledQuery {
            sql,
            params,
            columns,
        })
    }
}

fn typed(column: Column, raw: &str) -> Result<Value, CuffError> {
    let raw = raw.trim();
    let invalid = || {
        CuffError::InvalidLookup(format!(
            "`{raw}` is not a valid value for {}",
            column.name
        ))
    };
    match column.ty {
        FieldType::Text => Ok(Value::Text(raw.to_string())),
        FieldType::Integer => raw.parse().map(Value::Integer).map_err(|_| invalid()),
        FieldType::Real => raw.parse().map(Value::Real).map_err(|_| invalid()),
    }
}

fn like_pattern(prefix: &str, raw: &str, suffix: &str) -> Value {
    let mut pattern = String::with_capacity(raw.len() + 2);
    pattern.push_str(prefix);
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push_str(suffix);
    Value::Text(pattern)
}

fn split_list(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect()
}

fn condition(column: Column, filter: &Filter, params: &mut Vec<Value>) -> Result<String, CuffError> {
    let name = column.name;
    let raw = filter.value.as_str();
    let comparison = |op: &str, params: &mut Vec<Value>| -> Result<String, CuffError> {
        params.push(typed(column, raw)?);
        Ok(format!("{name} {op} ?"))
    };
    match filter.lookup {
        Lookup::Exact => comparison("=", params),
        Lookup::Gt => comparison(">", params),
        Lookup::Gte => comparison(">=", params),
        Lookup::Lt => comparison("<", params),
        Lookup::Lte => comparison("<=", params),
        Lookup::IExact => {
            params.push(Value::Text(raw.to_string()));
            Ok(format!("LOWER({name}) = LOWER(?)"))
        }
        Lookup::IContains => {
            params.push(like_pattern("%", raw, "%"));
            Ok(format!("{name} LIKE ? ESCAPE '\\'"))
        }
        Lookup::IStartsWith => {
            params.push(like_pattern("", raw, "%"));
            Ok(format!("{name} LIKE ? ESCAPE '\\'"))
        }
        Lookup::IEndsWith => {
            params.push(like_pattern("%", raw, ""));
            Ok(format!("{name} LIKE ? ESCAPE '\\'"))
        }
        Lookup::In => {
            let items = split_list(raw);
            if items.is_empty() {
                return Err(CuffError::InvalidLookup(format!("{name}__in needs values")));
            }
            for item in &items {
                params.push(typed(column, item)?);
            }
            Ok(format!("{name} IN ({})", vec!["?"; items.len()].join(", ")))
        }
        Lookup::Range => {
            let items = split_list(raw);
            let [low, high] = items.as_slice() else {
                return Err(CuffError::InvalidLookup(format!(
                    "{name}__range needs two values, got `{raw}`"
                )));
            };
            params.push(typed(column, low)?);
            params.push(typed(column, high)?);
            Ok(format!("{name} BETWEEN ? AND ?"))
        }
        Lookup::IsNull => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(format!("{name} IS NULL")),
            "false" | "0" | "no" => Ok(format!("{name} IS NOT NULL")),
            _ => Err(CuffError::InvalidLookup(format!(
                "{name}__isnull expects true or false, got `{raw}`"
            ))),
        },
        Lookup::IRegex => {
            let pattern = format!("(?i){raw}");
            Regex::new(&pattern)
                .map_err(|err| CuffError::InvalidLookup(format!("{name}__iregex: {err}")))?;
            params.push(Value::Text(pattern));
            Ok(format!("{name} REGEXP ?"))
        }
    }
}
