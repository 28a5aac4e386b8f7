use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::classifier::clauses::{JoinKind, SortDirection};
use crate::expr::{AggregateFunction, DatePart};

/// What a call to a registered name means in the generated query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum FunctionRole {
    /// `kind(left_path, right_path)`: join the entity of one path to the other.
    #[serde(rename = "join")]
    Join {
        /// Join type.
        join: JoinKind,
    },
    /// `f(value)`: aggregate over the group.
    #[serde(rename = "aggregate")]
    Aggregate {
        /// SQL aggregate.
        function: AggregateFunction,
    },
    /// `f_if(value, condition)`: aggregate restricted by `FILTER (WHERE condition)`.
    #[serde(rename = "conditional_aggregate")]
    ConditionalAggregate {
        /// SQL aggregate.
        function: AggregateFunction,
    },
    /// `asc(value)` / `desc(value)` around a selection item.
    #[serde(rename = "order")]
    Order {
        /// Sort direction.
        direction: SortDirection,
    },
    /// `EXTRACT(field FROM value)`.
    #[serde(rename = "extract")]
    Extract {
        /// Extracted field.
        field: DatePart,
    },
    /// `CURRENT_TIMESTAMP`, taking no arguments.
    #[serde(rename = "current_timestamp")]
    CurrentTimestamp,
    /// A plain SQL function, rendered as `sql_name(args...)`.
    #[serde(rename = "scalar")]
    Scalar {
        /// Function name in SQL.
        sql_name: String,
        /// Required argument count; `None` accepts any.
        #[serde(default)]
        arity: Option<usize>,
    },
}

impl FunctionRole {
    /// Number of arguments a call must pass, if fixed.
    pub fn arity(&self) -> Option<usize> {
        match self {
            FunctionRole::Join { .. } | FunctionRole::ConditionalAggregate { .. } => Some(2),
            FunctionRole::Aggregate { .. }
            | FunctionRole::Order { .. }
            | FunctionRole::Extract { .. } => Some(1),
            FunctionRole::CurrentTimestamp => Some(0),
            FunctionRole::Scalar { arity, .. } => *arity,
        }
    }
}

/// Maps call names found in traces to their role in the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRegistry {
    /// Function name → role lookup table.
    pub functions: HashMap<String, FunctionRole>,
}

impl FunctionRegistry {
    /// Create a registry with the built-in join, aggregate, ordering and
    /// date/time functions.
    pub fn new() -> Self {
        let mut registry = Self::empty();

        for (name, join) in [
            ("inner_join", JoinKind::Inner),
            ("left_join", JoinKind::Left),
            ("right_join", JoinKind::Right),
            ("full_join", JoinKind::Full),
        ] {
            registry.register(name, FunctionRole::Join { join });
        }

        for (name, function) in [
            ("min", AggregateFunction::Min),
            ("max", AggregateFunction::Max),
            ("sum", AggregateFunction::Sum),
            ("avg", AggregateFunction::Avg),
            ("count", AggregateFunction::Count),
        ] {
            registry.register(name, FunctionRole::Aggregate { function });
            registry.register(
                &format!("{name}_if"),
                FunctionRole::ConditionalAggregate { function },
            );
        }

        registry.register(
            "asc",
            FunctionRole::Order {
                direction: SortDirection::Asc,
            },
        );
        registry.register(
            "desc",
            FunctionRole::Order {
                direction: SortDirection::Desc,
            },
        );

        for (name, field) in [
            ("year", DatePart::Year),
            ("month", DatePart::Month),
            ("day", DatePart::Day),
            ("hour", DatePart::Hour),
            ("minute", DatePart::Minute),
            ("second", DatePart::Second),
        ] {
            registry.register(name, FunctionRole::Extract { field });
        }
        registry.register("now", FunctionRole::CurrentTimestamp);

        for (name, arity) in [
            ("lower", Some(1)),
            ("upper", Some(1)),
            ("length", Some(1)),
            ("abs", Some(1)),
            ("coalesce", None),
        ] {
            registry.register(
                name,
                FunctionRole::Scalar {
                    sql_name: name.to_string(),
                    arity,
                },
            );
        }

        registry
    }

    /// Create a registry that knows no functions.
    pub fn empty() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// Load function roles from a JSON object keyed by function name.
    /// Loaded entries replace built-ins of the same name.
    pub fn load_from_json(&mut self, json: &str) -> Result<(), String> {
        let parsed: HashMap<String, FunctionRole> = serde_json::from_str(json)
            .map_err(|e| format!("Invalid function registry JSON: {e}"))?;
        for (name, role) in parsed {
            if matches!(&role, FunctionRole::Scalar { sql_name, .. } if sql_name.is_empty()) {
                return Err(format!("Function '{name}' has an empty SQL name"));
            }
            self.functions.insert(name, role);
        }
        Ok(())
    }

    /// Add or replace a function role.
    pub fn register(&mut self, name: &str, role: FunctionRole) {
        self.functions.insert(name.to_string(), role);
    }

    /// Get the role of a function by name.
    pub fn get(&self, name: &str) -> Option<&FunctionRole> {
        self.functions.get(name)
    }

    /// Join type of a join marker, or `None` for any other name.
    pub fn join_marker(&self, name: &str) -> Option<JoinKind> {
        match self.get(name) {
            Some(FunctionRole::Join { join }) => Some(*join),
            _ => None,
        }
    }

    /// Direction of an ordering marker, or `None` for any other name.
    pub fn order_marker(&self, name: &str) -> Option<SortDirection> {
        match self.get(name) {
            Some(FunctionRole::Order { direction }) => Some(*direction),
            _ => None,
        }
    }

    /// Canonical JSON form, independent of insertion order.
    pub fn fingerprint(&self) -> String {
        let sorted: BTreeMap<&String, &FunctionRole> = self.functions.iter().collect();
        serde_json::to_string(&sorted).unwrap_or_default()
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
