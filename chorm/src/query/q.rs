//! Condition trees
//!
//! [`Q`] holds field conditions and nested trees joined with one boolean
//! mode. Trees combine with `&` and `|` and negate with `!`; every
//! combination produces a new tree and leaves the operands untouched.

use std::ops::{BitAnd, BitOr, Not};

use crate::data::QueryError;
use crate::model::FieldSet;

use super::condition::{FieldCondition, Operand};

/// Boolean connective of a tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    And,
    Or,
}

impl Mode {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Mode::And => "AND",
            Mode::Or => "OR",
        }
    }
}

/// Composable tree of field conditions
///
/// ```
/// use chorm::q;
///
/// let adults = q!(age__gte = 18);
/// let named = q!(first_name = "Ciaran") | q!(first_name = "Marc");
/// let both = adults & named;
/// assert_eq!(both.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Q {
    conditions: Vec<FieldCondition>,
    children: Vec<Q>,
    mode: Mode,
    negate: bool,
}

impl Q {
    /// Empty tree; matches everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition from a lookup key such as `"height__gt"`
    pub fn lookup(mut self, key: &str, value: impl Into<Operand>) -> Self {
        self.conditions.push(FieldCondition::parse(key, value));
        self
    }

    /// Add an already built condition
    pub fn condition(mut self, condition: FieldCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.children.is_empty()
    }

    /// Number of top-level conditions, counting each child tree as one
    pub fn len(&self) -> usize {
        self.conditions.len() + self.children.len()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_negated(&self) -> bool {
        self.negate
    }

    pub fn conditions(&self) -> &[FieldCondition] {
        &self.conditions
    }

    pub fn children(&self) -> &[Q] {
        &self.children
    }

    pub fn and(self, other: Q) -> Q {
        Self::combine(self, other, Mode::And)
    }

    pub fn or(self, other: Q) -> Q {
        Self::combine(self, other, Mode::Or)
    }

    /// Whether this tree can absorb operands joined with `mode`
    fn accepts(&self, mode: Mode) -> bool {
        self.mode == mode && !self.negate
    }

    fn combine(left: Q, right: Q, mode: Mode) -> Q {
        if left.accepts(mode) {
            let mut base = left;
            if right.accepts(mode) {
                base.conditions.extend(right.conditions);
                base.children.extend(right.children);
            } else {
                base.children.push(right);
            }
            base
        } else if right.accepts(mode) {
            let mut base = right;
            base.children.push(left);
            base
        } else {
            Q {
                children: vec![left, right],
                mode,
                ..Q::default()
            }
        }
    }

    /// Render as a SQL boolean expression; an empty tree renders as `1`
    /// (`NOT (1)` when negated)
    pub fn to_sql(&self, fields: &FieldSet) -> Result<String, QueryError> {
        let mut parts = self
            .conditions
            .iter()
            .map(|c| c.to_sql(fields))
            .collect::<Result<Vec<_>, _>>()?;
        for child in self.children.iter().filter(|c| !c.is_empty()) {
            parts.push(child.to_sql(fields)?);
        }

        let sql = match parts.len() {
            0 => "1".to_string(),
            1 => parts.swap_remove(0),
            _ => {
                let separator = format!(") {} (", self.mode.as_sql());
                format!("({})", parts.join(separator.as_str()))
            }
        };
        if self.negate {
            Ok(format!("NOT ({})", sql))
        } else {
            Ok(sql)
        }
    }
}

impl From<FieldCondition> for Q {
    fn from(condition: FieldCondition) -> Self {
        Q::new().condition(condition)
    }
}

impl BitAnd for Q {
    type Output = Q;

    fn bitand(self, rhs: Q) -> Q {
        self.and(rhs)
    }
}

impl BitAnd<&Q> for &Q {
    type Output = Q;

    fn bitand(self, rhs: &Q) -> Q {
        self.clone().and(rhs.clone())
    }
}

impl BitOr for Q {
    type Output = Q;

    fn bitor(self, rhs: Q) -> Q {
        self.or(rhs)
    }
}

impl BitOr<&Q> for &Q {
    type Output = Q;

    fn bitor(self, rhs: &Q) -> Q {
        self.clone().or(rhs.clone())
    }
}

impl Not for Q {
    type Output = Q;

    fn not(self) -> Q {
        if self.negate {
            // wrap so both negations render
            Q {
                children: vec![self],
                negate: true,
                ..Q::default()
            }
        } else {
            Q {
                negate: true,
                ..self
            }
        }
    }
}

impl Not for &Q {
    type Output = Q;

    fn not(self) -> Q {
        !self.clone()
    }
}

impl FromIterator<Q> for Q {
    /// AND-combine all trees
    fn from_iter<I: IntoIterator<Item = Q>>(iter: I) -> Self {
        iter.into_iter().fold(Q::new(), Q::and)
    }
}

/// Build a [`Q`] from `key = value` pairs, AND-combined
///
/// Keys follow the lookup syntax `field` or `field__operator`.
///
/// ```
/// use chorm::q;
///
/// let q = q!(first_name__istartswith = "ci", height__gt = 1.8);
/// assert_eq!(q.len(), 2);
/// ```
#[macro_export]
macro_rules! q {
    () => {
        $crate::query::Q::new()
    };
    ($($key:ident = $value:expr),+ $(,)?) => {
        $crate::query::Q::new()$(.lookup(stringify!($key), $value))+
    };
}
