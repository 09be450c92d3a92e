//! Query builder
//!
//! A [`QuerySet`] describes a SELECT over one model's table. Every builder
//! method returns a new value; nothing touches the database until `fetch`,
//! `get`, `count`, `exists` or `paginate` is awaited.

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Bound, RangeBounds};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::data::{DataSource, QueryError};
use crate::model::{FieldSet, Model};
use crate::utils::sql::{comma_join, quote_identifier};

use super::aggregate::AggregateQuerySet;
use super::condition::{Operand, Subquery};
use super::page::{Page, PageWindow};
use super::q::Q;

/// Render an ORDER BY list; a leading `-` means descending
fn ordering_sql(ordering: &[String]) -> String {
    comma_join(ordering.iter().map(|field| match field.strip_prefix('-') {
        Some(name) => format!("{} DESC", name),
        None => field.clone(),
    }))
}

/// Parts of a SELECT statement, rendered in clause order
pub(crate) struct SelectSql<'a> {
    pub distinct: bool,
    pub projection: String,
    pub table: &'a str,
    pub is_final: bool,
    pub prewhere: &'a Q,
    pub where_q: &'a Q,
    pub group_by: &'a [String],
    pub with_totals: bool,
    pub ordering: &'a [String],
    pub limits: Option<(u64, u64)>,
}

impl SelectSql<'_> {
    pub fn render(&self, fields: &FieldSet) -> Result<String, QueryError> {
        let mut sql = format!(
            "SELECT {}{}\nFROM {}{}",
            if self.distinct { "DISTINCT " } else { "" },
            self.projection,
            quote_identifier(self.table),
            if self.is_final { " FINAL" } else { "" },
        );
        if !self.prewhere.is_empty() {
            sql.push_str("\nPREWHERE ");
            sql.push_str(&self.prewhere.to_sql(fields)?);
        }
        if !self.where_q.is_empty() {
            sql.push_str("\nWHERE ");
            sql.push_str(&self.where_q.to_sql(fields)?);
        }
        if !self.group_by.is_empty() {
            sql.push_str("\nGROUP BY ");
            sql.push_str(&comma_join(
                self.group_by.iter().map(|name| quote_identifier(name)),
            ));
            if self.with_totals {
                sql.push_str(" WITH TOTALS");
            }
        }
        if !self.ordering.is_empty() {
            sql.push_str("\nORDER BY ");
            sql.push_str(&ordering_sql(self.ordering));
        }
        if let Some((offset, count)) = self.limits {
            sql.push_str(&format!("\nLIMIT {}, {}", offset, count));
        }
        Ok(sql)
    }
}

/// Convert an index range into `(offset, count)` limits
fn range_limits(range: impl RangeBounds<i64>) -> Result<(u64, u64), QueryError> {
    let start = match range.start_bound() {
        Bound::Included(&s) => s,
        Bound::Excluded(&s) => s.saturating_add(1),
        Bound::Unbounded => 0,
    };
    let stop = match range.end_bound() {
        Bound::Included(&e) => e.saturating_add(1),
        Bound::Excluded(&e) => e,
        Bound::Unbounded => i64::MAX,
    };
    if start < 0 || stop < 0 {
        return Err(QueryError::invalid_argument(
            "negative indexes are not supported",
        ));
    }
    if stop < start {
        return Err(QueryError::invalid_argument(
            "start of slice cannot be greater than its end",
        ));
    }
    Ok((start as u64, (stop - start) as u64))
}

/// Count rows of a rendered statement with `SELECT count() FROM (...)`
pub(crate) async fn count_subquery<S: DataSource>(
    source: &S,
    sql: &str,
) -> Result<u64, QueryError> {
    let raw = source.raw(&format!("SELECT count() FROM ({})", sql)).await?;
    match raw {
        Some(value) => value.trim().parse::<u64>().map_err(|_| {
            QueryError::Source(format!("count query returned a non-integer: {}", value))
        }),
        None => Ok(0),
    }
}

/// Immutable, lazily executed SELECT over model `M`
pub struct QuerySet<M: Model, S: DataSource> {
    source: Arc<S>,
    ordering: Vec<String>,
    where_q: Q,
    prewhere_q: Q,
    fields: Vec<String>,
    limits: Option<(u64, u64)>,
    distinct: bool,
    is_final: bool,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model, S: DataSource> Clone for QuerySet<M, S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            ordering: self.ordering.clone(),
            where_q: self.where_q.clone(),
            prewhere_q: self.prewhere_q.clone(),
            fields: self.fields.clone(),
            limits: self.limits,
            distinct: self.distinct,
            is_final: self.is_final,
            _model: PhantomData,
        }
    }
}

impl<M: Model, S: DataSource> fmt::Debug for QuerySet<M, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySet")
            .field("table", &M::table_name())
            .field("ordering", &self.ordering)
            .field("where_q", &self.where_q)
            .field("prewhere_q", &self.prewhere_q)
            .field("fields", &self.fields)
            .field("limits", &self.limits)
            .field("distinct", &self.distinct)
            .field("is_final", &self.is_final)
            .finish_non_exhaustive()
    }
}

impl<M: Model, S: DataSource> QuerySet<M, S> {
    /// All rows and all fields of `M`'s table
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            ordering: Vec::new(),
            where_q: Q::new(),
            prewhere_q: Q::new(),
            fields: Vec::new(),
            limits: None,
            distinct: false,
            is_final: false,
            _model: PhantomData,
        }
    }

    // ==================== Derivation ====================

    /// Keep only rows matching `q`
    pub fn filter(&self, q: Q) -> Self {
        Self {
            where_q: &self.where_q & &q,
            ..self.clone()
        }
    }

    /// Drop rows matching `q`
    pub fn exclude(&self, q: Q) -> Self {
        Self {
            where_q: &self.where_q & &!q,
            ..self.clone()
        }
    }

    /// Like [`filter`](Self::filter), applied in the PREWHERE clause
    pub fn prewhere(&self, q: Q) -> Self {
        Self {
            prewhere_q: &self.prewhere_q & &q,
            ..self.clone()
        }
    }

    /// Like [`exclude`](Self::exclude), applied in the PREWHERE clause
    pub fn prewhere_exclude(&self, q: Q) -> Self {
        Self {
            prewhere_q: &self.prewhere_q & &!q,
            ..self.clone()
        }
    }

    /// Replace the ordering; prefix a field with `-` for descending order
    pub fn order_by<I, T>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            ordering: fields.into_iter().map(Into::into).collect(),
            ..self.clone()
        }
    }

    /// Select only the given fields
    pub fn only<I, T>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            ..self.clone()
        }
    }

    pub fn distinct(&self) -> Self {
        Self {
            distinct: true,
            ..self.clone()
        }
    }

    /// Add the FINAL modifier; only for collapsing and replacing engines
    pub fn final_(&self) -> Result<Self, QueryError> {
        let engine = M::engine();
        if !engine.supports_final() {
            return Err(QueryError::unsupported(format!(
                "final() is not supported by the {} engine of `{}`",
                engine,
                M::table_name()
            )));
        }
        Ok(Self {
            is_final: true,
            ..self.clone()
        })
    }

    /// Restrict to the rows at `range` (a half-open or closed index range)
    ///
    /// `qs.slice(0..10)` renders `LIMIT 0, 10`.
    pub fn slice(&self, range: impl RangeBounds<i64>) -> Result<Self, QueryError> {
        Ok(Self {
            limits: Some(range_limits(range)?),
            ..self.clone()
        })
    }

    /// Aggregate with `grouping_fields` and `calculated_fields` (name, expression)
    ///
    /// ```ignore
    /// let per_type = Event::objects_in(source)
    ///     .filter(q!(date__gt = "2017-08-01"))
    ///     .aggregate(["event_type"], [("count", "count()")])?;
    /// ```
    pub fn aggregate<G, GI, C, K, V>(
        &self,
        grouping_fields: G,
        calculated_fields: C,
    ) -> Result<AggregateQuerySet<M, S>, QueryError>
    where
        G: IntoIterator<Item = GI>,
        GI: Into<String>,
        C: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let grouping: Vec<String> = grouping_fields.into_iter().map(Into::into).collect();
        let calculated: IndexMap<String, String> = calculated_fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        AggregateQuerySet::new(self, grouping, calculated)
    }

    /// Restrict to `count` rows starting at `offset`
    pub(crate) fn with_limits(&self, offset: u64, count: u64) -> Self {
        Self {
            limits: Some((offset, count)),
            ..self.clone()
        }
    }

    /// Same filters, ordering, limits and DISTINCT flag, all fields, no FINAL
    pub(crate) fn without_projection_and_final(&self) -> Self {
        Self {
            fields: Vec::new(),
            is_final: false,
            ..self.clone()
        }
    }

    // ==================== Rendering ====================

    fn projection(&self) -> String {
        if self.fields.is_empty() {
            "*".to_string()
        } else {
            comma_join(self.fields.iter().map(|f| quote_identifier(f)))
        }
    }

    /// Render the full SELECT statement
    pub fn as_sql(&self) -> Result<String, QueryError> {
        SelectSql {
            distinct: self.distinct,
            projection: self.projection(),
            table: M::table_name(),
            is_final: self.is_final,
            prewhere: &self.prewhere_q,
            where_q: &self.where_q,
            group_by: &[],
            with_totals: false,
            ordering: &self.ordering,
            limits: self.limits,
        }
        .render(M::fields())
    }

    // ==================== Execution ====================

    /// Fetch all matching rows
    pub async fn fetch(&self) -> Result<Vec<M>, QueryError> {
        let sql = self.as_sql()?;
        tracing::trace!(table = M::table_name(), sql = %sql, "Fetching rows");
        self.source.select::<M>(&sql).await
    }

    /// Fetch the row at `index`
    pub async fn get(&self, index: i64) -> Result<M, QueryError> {
        if index < 0 {
            return Err(QueryError::invalid_argument(
                "negative indexes are not supported",
            ));
        }
        self.with_limits(index as u64, 1)
            .fetch()
            .await?
            .into_iter()
            .next()
            .ok_or(QueryError::DoesNotExist {
                index: index as u64,
            })
    }

    /// Number of matching rows
    ///
    /// With DISTINCT or limits the statement is counted as a subquery,
    /// otherwise the source counts the table directly.
    pub async fn count(&self) -> Result<u64, QueryError> {
        if self.distinct || self.limits.is_some() {
            return count_subquery(self.source.as_ref(), &self.as_sql()?).await;
        }
        let conditions = (&self.where_q & &self.prewhere_q).to_sql(M::fields())?;
        self.source.count(M::table_name(), &conditions).await
    }

    /// Whether any row matches
    pub async fn exists(&self) -> Result<bool, QueryError> {
        Ok(self.count().await? > 0)
    }

    /// Fetch one page of `page_size` rows; `-1` is the last page
    ///
    /// Apply `order_by` first so that pages partition the rows consistently.
    pub async fn paginate(&self, page_num: i64, page_size: u64) -> Result<Page<M>, QueryError> {
        if page_size == 0 {
            return Err(QueryError::invalid_argument("page size must be positive"));
        }
        let count = self.count().await?;
        let window = PageWindow::resolve(page_num, page_size, count)?;
        let objects = self.with_limits(window.offset, page_size).fetch().await?;
        Ok(window.into_page(objects, count, page_size))
    }

    // ==================== Accessors ====================

    pub fn where_condition(&self) -> &Q {
        &self.where_q
    }

    pub fn prewhere_condition(&self) -> &Q {
        &self.prewhere_q
    }

    pub fn ordering(&self) -> &[String] {
        &self.ordering
    }

    pub fn selected_fields(&self) -> &[String] {
        &self.fields
    }

    pub fn limits(&self) -> Option<(u64, u64)> {
        self.limits
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }
}

impl<M: Model, S: DataSource> Subquery for QuerySet<M, S> {
    fn as_sql(&self) -> Result<String, QueryError> {
        QuerySet::as_sql(self)
    }

    fn box_clone(&self) -> Box<dyn Subquery> {
        Box::new(self.clone())
    }
}

impl<M: Model, S: DataSource> From<QuerySet<M, S>> for Operand {
    fn from(qs: QuerySet<M, S>) -> Self {
        Operand::subquery(qs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::q;
    use crate::testing::{MemorySource, Person, Visit};

    fn people() -> QuerySet<Person, MemorySource> {
        Person::objects_in(Arc::new(MemorySource::new()))
    }

    #[test]
    fn test_default_sql() {
        assert_eq!(people().as_sql().unwrap(), "SELECT *\nFROM `person`");
    }

    #[test]
    fn test_full_clause_order() {
        let qs = people()
            .filter(q!(first_name = "Ciaran"))
            .prewhere(q!(height__gt = 1.5))
            .order_by(["-height", "last_name"])
            .only(["first_name", "height"])
            .distinct()
            .slice(5..15)
            .unwrap();
        assert_eq!(
            qs.as_sql().unwrap(),
            "SELECT DISTINCT `first_name`, `height`\n\
             FROM `person`\n\
             PREWHERE height > 1.5\n\
             WHERE first_name = 'Ciaran'\n\
             ORDER BY height DESC, last_name\n\
             LIMIT 5, 10"
        );
    }

    #[test]
    fn test_derivation_leaves_receiver_untouched() {
        let base = people();
        let filtered = base.filter(q!(first_name = "a"));
        assert!(base.where_condition().is_empty());
        assert_eq!(filtered.where_condition().len(), 1);

        let ordered = filtered.order_by(["height"]);
        assert!(filtered.ordering().is_empty());
        assert_eq!(ordered.ordering(), ["height".to_string()]);
    }

    #[test]
    fn test_filter_accumulates() {
        let qs = people()
            .filter(q!(first_name = "a"))
            .filter(q!(last_name = "b") | q!(last_name = "c"));
        assert_eq!(
            qs.as_sql().unwrap(),
            "SELECT *\nFROM `person`\nWHERE (first_name = 'a') AND ((last_name = 'b') OR (last_name = 'c'))"
        );
    }

    #[test]
    fn test_exclude() {
        let qs = people().exclude(q!(first_name = "a", last_name = "b"));
        assert_eq!(
            qs.as_sql().unwrap(),
            "SELECT *\nFROM `person`\nWHERE NOT ((first_name = 'a') AND (last_name = 'b'))"
        );
        let qs = people().prewhere_exclude(q!(height__lt = 1));
        assert_eq!(
            qs.as_sql().unwrap(),
            "SELECT *\nFROM `person`\nPREWHERE NOT (height < 1)"
        );
    }

    #[test]
    fn test_slicing() {
        assert_eq!(people().slice(0..10).unwrap().limits(), Some((0, 10)));
        assert_eq!(people().slice(5..6).unwrap().limits(), Some((5, 1)));
        assert_eq!(people().slice(5..=6).unwrap().limits(), Some((5, 2)));
        assert_eq!(
            people().slice(3..).unwrap().limits(),
            Some((3, (i64::MAX - 3) as u64))
        );
        assert!(
            people()
                .slice(0..10)
                .unwrap()
                .as_sql()
                .unwrap()
                .ends_with("\nLIMIT 0, 10")
        );
    }

    #[test]
    fn test_slicing_rejects_bad_ranges() {
        assert!(matches!(
            people().slice(-1..3),
            Err(QueryError::InvalidArgument(_))
        ));
        assert!(matches!(
            people().slice(5..2),
            Err(QueryError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_final_requires_collapsing_engine() {
        assert!(matches!(people().final_(), Err(QueryError::Unsupported(_))));

        let visits = Visit::objects_in(Arc::new(MemorySource::new()));
        let sql = visits.final_().unwrap().as_sql().unwrap();
        assert_eq!(sql, "SELECT *\nFROM `visit` FINAL");
    }

    #[test]
    fn test_subquery_operand() {
        let visitors = Visit::objects_in(Arc::new(MemorySource::new()))
            .filter(q!(sign = 1))
            .only(["id"]);
        let qs = people().filter(q!(passport__in = visitors));
        assert_eq!(
            qs.as_sql().unwrap(),
            "SELECT *\nFROM `person`\nWHERE passport IN (SELECT `id`\nFROM `visit`\nWHERE sign = 1)"
        );
    }

    #[test]
    fn test_render_error_surfaces() {
        let qs = people().filter(q!(weight__gt = 80));
        assert!(matches!(qs.as_sql(), Err(QueryError::FieldNotFound { .. })));
    }

    #[tokio::test]
    async fn test_fetch_and_get() {
        let source = MemorySource::people(5);
        let qs = Person::objects_in(source.clone());

        let rows = qs.fetch().await.unwrap();
        assert_eq!(rows.len(), 5);

        let third = qs.get(2).await.unwrap();
        assert_eq!(third.first_name, "person2");
        assert_eq!(
            source.last_statement().unwrap(),
            "SELECT *\nFROM `person`\nLIMIT 2, 1"
        );

        let err = qs.get(5).await.unwrap_err();
        assert!(matches!(err, QueryError::DoesNotExist { index: 5 }));
        assert!(matches!(
            qs.get(-1).await,
            Err(QueryError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_count_simple_uses_table_count() {
        let source = MemorySource::people(7);
        let qs = Person::objects_in(source.clone())
            .filter(q!(first_name = "a"))
            .prewhere(q!(height__gt = 1));
        assert_eq!(qs.count().await.unwrap(), 7);
        assert_eq!(
            source.last_statement().unwrap(),
            "COUNT `person` WHERE (first_name = 'a') AND (height > 1)"
        );
    }

    #[tokio::test]
    async fn test_count_conditions_match_select_clauses() {
        fn top_level_parts(sql: &str) -> Vec<String> {
            let inner = sql.strip_prefix('(').and_then(|s| s.strip_suffix(')'));
            let mut parts: Vec<String> = match inner {
                Some(inner) => inner.split(") AND (").map(str::to_string).collect(),
                None => vec![sql.to_string()],
            };
            parts.sort();
            parts
        }

        let source = MemorySource::people(4);
        let qs = Person::objects_in(source.clone())
            .filter(q!(first_name = "a") | q!(last_name = "b"))
            .exclude(q!(height__lt = 1))
            .prewhere(q!(passport__gt = 3));

        let where_sql = "((first_name = 'a') OR (last_name = 'b')) AND (NOT (height < 1))";
        let prewhere_sql = "passport > 3";
        assert_eq!(
            qs.as_sql().unwrap(),
            format!(
                "SELECT *\nFROM `person`\nPREWHERE {}\nWHERE {}",
                prewhere_sql, where_sql
            )
        );

        assert_eq!(qs.count().await.unwrap(), 4);
        let statement = source.last_statement().unwrap();
        let conditions = statement.strip_prefix("COUNT `person` WHERE ").unwrap();
        assert_eq!(
            conditions,
            "(passport > 3) AND ((first_name = 'a') OR (last_name = 'b')) AND (NOT (height < 1))"
        );

        let mut expected = top_level_parts(where_sql);
        expected.extend(top_level_parts(prewhere_sql));
        expected.sort();
        assert_eq!(top_level_parts(conditions), expected);
    }

    #[tokio::test]
    async fn test_count_without_conditions() {
        let source = MemorySource::people(3);
        let qs = Person::objects_in(source.clone());
        assert_eq!(qs.count().await.unwrap(), 3);
        assert_eq!(source.last_statement().unwrap(), "COUNT `person` WHERE 1");
        assert!(qs.exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_count_with_limits_uses_subquery() {
        let source = MemorySource::people(7);
        let qs = Person::objects_in(source.clone()).slice(5..10).unwrap();
        assert_eq!(qs.count().await.unwrap(), 2);
        assert_eq!(
            source.last_statement().unwrap(),
            "SELECT count() FROM (SELECT *\nFROM `person`\nLIMIT 5, 5)"
        );

        let qs = Person::objects_in(source.clone()).distinct();
        assert_eq!(qs.count().await.unwrap(), 7);
        assert!(
            source
                .last_statement()
                .unwrap()
                .starts_with("SELECT count() FROM (SELECT DISTINCT")
        );
    }

    #[tokio::test]
    async fn test_exists_on_empty_source() {
        let qs = Person::objects_in(Arc::new(MemorySource::new()));
        assert!(!qs.exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_paginate() {
        let source = MemorySource::people(250);
        let qs = Person::objects_in(source.clone()).order_by(["first_name"]);

        let page = qs.paginate(1, 100).await.unwrap();
        assert_eq!(page.objects.len(), 100);
        assert_eq!(page.number_of_objects, 250);
        assert_eq!(page.pages_total, 3);
        assert_eq!(page.number, 1);
        assert_eq!(page.page_size, 100);

        let page = qs.paginate(-1, 100).await.unwrap();
        assert_eq!(page.objects.len(), 50);
        assert_eq!(page.number, 3);
        assert!(page.is_last());

        let page = qs.paginate(4, 100).await.unwrap();
        assert!(page.objects.is_empty());
        assert_eq!(page.number, 4);
    }

    #[tokio::test]
    async fn test_paginate_rejects_bad_arguments() {
        let qs = Person::objects_in(MemorySource::people(3));
        assert!(matches!(
            qs.paginate(0, 10).await,
            Err(QueryError::InvalidArgument(_))
        ));
        assert!(matches!(
            qs.paginate(1, 0).await,
            Err(QueryError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_paginate_last_page_of_empty_result() {
        let qs = Person::objects_in(Arc::new(MemorySource::new()));
        let page = qs.paginate(-1, 10).await.unwrap();
        assert_eq!(page.number, 1);
        assert_eq!(page.pages_total, 0);
        assert!(page.objects.is_empty());
    }
}
