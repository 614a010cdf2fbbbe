use super::tables::{Backing, CalendarTable, YearTable};
use super::Freezer;
use crate::graph::{predefined, Graph, LockLevel, NodeId};
use crate::storage::{Properties, StorageError};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use std::sync::Arc;

const SECONDS_PER_DAY: i64 = 86_400;

/// Lazily built, persisted calendar constants plus the conversions between
/// wall-clock values and time clusters.
pub struct TimeCache {
    backing: Backing,
    seconds: CalendarTable,
    minutes: CalendarTable,
    hours: CalendarTable,
    days: CalendarTable,
    days_of_week: CalendarTable,
    months: CalendarTable,
    years: YearTable,
}

impl TimeCache {
    pub fn new(graph: Arc<Graph>, properties: Properties, owner: impl Into<String>) -> Self {
        Self {
            backing: Backing {
                graph,
                properties,
                owner: owner.into(),
            },
            seconds: CalendarTable::new("Seconds", 0, 60),
            minutes: CalendarTable::new("Minutes", 0, 60),
            hours: CalendarTable::new("Hours", 0, 25),
            days: CalendarTable::new("Days", 1, 31),
            days_of_week: CalendarTable::new("DaysOfWeek", 0, 7),
            months: CalendarTable::new("Months", 1, 12),
            years: YearTable::new(),
        }
    }

    fn graph(&self) -> &Graph {
        &self.backing.graph
    }

    fn tables(&self) -> [&CalendarTable; 6] {
        [
            &self.seconds,
            &self.minutes,
            &self.hours,
            &self.days,
            &self.days_of_week,
            &self.months,
        ]
    }

    pub fn seconds(&self) -> Vec<NodeId> { self.seconds.ids(&self.backing) }
    pub fn minutes(&self) -> Vec<NodeId> { self.minutes.ids(&self.backing) }
    pub fn hours(&self) -> Vec<NodeId> { self.hours.ids(&self.backing) }
    pub fn days(&self) -> Vec<NodeId> { self.days.ids(&self.backing) }
    pub fn days_of_week(&self) -> Vec<NodeId> { self.days_of_week.ids(&self.backing) }
    pub fn months(&self) -> Vec<NodeId> { self.months.ids(&self.backing) }

    pub fn second(&self, second: u32) -> Option<NodeId> {
        self.seconds.for_value(second as i64, &self.backing)
    }

    pub fn minute(&self, minute: u32) -> Option<NodeId> {
        self.minutes.for_value(minute as i64, &self.backing)
    }

    pub fn hour(&self, hour: u32) -> Option<NodeId> {
        self.hours.for_value(hour as i64, &self.backing)
    }

    /// Day of the month, 1-based.
    pub fn day(&self, day: u32) -> Option<NodeId> {
        self.days.for_value(day as i64, &self.backing)
    }

    /// Day of the week counted from Sunday = 0.
    pub fn day_of_week(&self, day: u32) -> Option<NodeId> {
        self.days_of_week.for_value(day as i64, &self.backing)
    }

    /// Month, 1-based.
    pub fn month(&self, month: u32) -> Option<NodeId> {
        self.months.for_value(month as i64, &self.backing)
    }

    pub fn year(&self, year: i32) -> NodeId {
        self.years.get(year, &self.backing)
    }

    pub fn year_count(&self) -> usize {
        self.years.len(&self.backing)
    }

    /// Loads every table now instead of on first access.
    pub fn preload(&self) {
        for table in self.tables() {
            table.preload(&self.backing);
        }
        self.years.preload(&self.backing);
    }

    /// Builds a `Time` cluster: year, month, day, hour, minute, second, day of week.
    pub fn build_time_cluster(&self, value: NaiveDateTime, freezer: Option<&mut dyn Freezer>) -> Option<NodeId> {
        let rest = [
            self.month(value.month()),
            self.day(value.day()),
            self.hour(value.hour()),
            self.minute(value.minute()),
            self.second(value.second()),
            self.day_of_week(value.weekday().num_days_from_sunday()),
        ];
        self.build_dated_cluster(value.year(), &rest, freezer)
    }

    /// Builds a `Time` cluster holding only year, month and day.
    pub fn build_short_time_cluster(&self, value: NaiveDate, freezer: Option<&mut dyn Freezer>) -> Option<NodeId> {
        let rest = [self.month(value.month()), self.day(value.day())];
        self.build_dated_cluster(value.year(), &rest, freezer)
    }

    fn build_dated_cluster(
        &self,
        year: i32,
        rest: &[Option<NodeId>],
        freezer: Option<&mut dyn Freezer>,
    ) -> Option<NodeId> {
        let rest: Option<Vec<NodeId>> = rest.iter().copied().collect();
        let Some(rest) = rest else {
            log::error!("Calendar tables are missing an entry for year {}", year);
            return None;
        };

        let created = self.years.with_year(year, &self.backing, |year| {
            let mut children = Vec::with_capacity(rest.len() + 1);
            children.push(year);
            children.extend_from_slice(&rest);
            self.graph().create_cluster(predefined::TIME, &children)
        });
        self.finish_cluster(created, freezer)
    }

    /// Builds a `TimeSpan` cluster: days, hours, minutes, seconds.
    pub fn build_time_span_cluster(&self, span: Duration, freezer: Option<&mut dyn Freezer>) -> Option<NodeId> {
        let total = span.num_seconds();
        let days = total / SECONDS_PER_DAY;
        let rest = total % SECONDS_PER_DAY;
        let children = [
            self.span_component(&self.days, days),
            self.span_component(&self.hours, rest / 3600),
            self.span_component(&self.minutes, rest % 3600 / 60),
            self.span_component(&self.seconds, rest % 60),
        ];
        let created = self.graph().create_cluster(predefined::TIME_SPAN, &children);
        self.finish_cluster(created, freezer)
    }

    /// Table constant when in range, otherwise a private constant owned by the cluster.
    fn span_component(&self, table: &CalendarTable, value: i64) -> NodeId {
        table
            .for_value(value, &self.backing)
            .unwrap_or_else(|| self.graph().create_constant_int(value))
    }

    fn finish_cluster(
        &self,
        created: Result<NodeId, crate::graph::GraphError>,
        freezer: Option<&mut dyn Freezer>,
    ) -> Option<NodeId> {
        match created {
            Ok(cluster) => {
                if let Some(freezer) = freezer {
                    freezer.freeze(cluster);
                }
                Some(cluster)
            }
            Err(e) => {
                log::error!("Failed to build time cluster: {}", e);
                None
            }
        }
    }

    fn int_children(&self, cluster: NodeId, meaning: NodeId) -> Option<Vec<i64>> {
        let (found, children) = self.graph().cluster(cluster)?;
        if found != meaning {
            return None;
        }
        children.iter().map(|c| self.graph().int_value(*c)).collect()
    }

    /// Reads a `Time` cluster back. Year, month and day are required; hour,
    /// minute and second are applied when present.
    pub fn parse_time_cluster(&self, cluster: NodeId) -> Option<NaiveDateTime> {
        let values = self.int_children(cluster, predefined::TIME)?;
        if values.len() < 3 {
            return None;
        }
        let part = |i: usize| -> Option<u32> {
            values.get(i).map_or(Some(0), |v| u32::try_from(*v).ok())
        };

        let year = i32::try_from(values[0]).ok()?;
        let date = NaiveDate::from_ymd_opt(year, part(1)?, part(2)?)?;
        date.and_hms_opt(part(3)?, part(4)?, part(5)?)
    }

    /// Reads a `TimeSpan` cluster back; missing trailing parts count as zero.
    pub fn parse_time_span_cluster(&self, cluster: NodeId) -> Option<Duration> {
        let values = self.int_children(cluster, predefined::TIME_SPAN)?;
        if values.is_empty() || values.len() > 4 {
            return None;
        }
        let factors = [SECONDS_PER_DAY, 3600, 60, 1];
        let total = values
            .iter()
            .zip(factors)
            .try_fold(0i64, |acc, (v, f)| acc.checked_add(v.checked_mul(f)?))?;
        Some(Duration::seconds(total))
    }

    /// Deletes a time cluster when no link and no parent cluster refers to it.
    pub fn reclaim_if_unused(&self, cluster: NodeId) -> bool {
        self.remove_cluster(cluster, true)
    }

    /// Deletes a time cluster regardless of the links pointing at it.
    pub fn delete_time_cluster(&self, cluster: NodeId) -> bool {
        self.remove_cluster(cluster, false)
    }

    fn remove_cluster(&self, cluster: NodeId, only_if_unused: bool) -> bool {
        let graph = self.graph();
        let _lock = graph.request_lock(cluster, LockLevel::All);

        let Some((meaning, children)) = graph.cluster(cluster) else {
            return false;
        };
        if meaning != predefined::TIME && meaning != predefined::TIME_SPAN {
            return false;
        }
        if only_if_unused && !graph.is_unreferenced(cluster) {
            return false;
        }
        if !graph.delete_node(cluster) {
            return false;
        }

        if meaning == predefined::TIME {
            if let Some(&year) = children.first() {
                self.years.release_if_unreferenced(year, &self.backing);
            }
        }
        // Private span constants go with their cluster; pinned table entries stay.
        for child in children {
            if graph.usage(child) == Some(0) && graph.is_unreferenced(child) {
                graph.delete_node(child);
            }
        }
        true
    }

    /// Persists the tables changed since the last flush; returns how many were written.
    pub fn flush(&self) -> Result<usize, StorageError> {
        let mut written = 0;
        for table in self.tables() {
            if table.flush(&self.backing)? {
                written += 1;
            }
        }
        if self.years.flush(&self.backing)? {
            written += 1;
        }
        Ok(written)
    }

    /// Forgets every loaded table without writing anything.
    pub fn reset(&self) {
        for table in self.tables() {
            table.reset();
        }
        self.years.reset();
    }
}
