//! Surrogate id generation for rows created by reconciliation.
//!
//! # Responsibility
//! - Hand out ids that collide with no persisted row of the target class,
//!   tombstoned rows included.
//!
//! # Invariants
//! - Ids are strictly positive.
//! - One generator instance never returns the same id twice for a class.
//! - Generators are used inside the reconciliation transaction, so the
//!   existence checks and inserts observe one consistent snapshot.

use crate::config::{IdStrategy, ProbeConfig};
use crate::db::DbError;
use log::warn;
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Entity classes that receive generated ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityClass {
    ShiftType,
    ShiftPosition,
    ShiftTime,
}

impl EntityClass {
    pub fn table(self) -> &'static str {
        match self {
            Self::ShiftType => "shift_types",
            Self::ShiftPosition => "shift_positions",
            Self::ShiftTime => "shift_times",
        }
    }
}

impl Display for EntityClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table())
    }
}

#[derive(Debug)]
pub enum IdGenError {
    /// Retry budget spent without finding a free id.
    Exhausted { class: EntityClass, attempts: u32 },
    Db(DbError),
}

impl Display for IdGenError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exhausted { class, attempts } => {
                write!(f, "no free id for {class} after {attempts} attempts")
            }
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for IdGenError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Exhausted { .. } => None,
            Self::Db(err) => Some(err),
        }
    }
}

impl From<rusqlite::Error> for IdGenError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Id source for one reconciliation.
pub trait IdGenerator {
    fn generate(&mut self, conn: &Connection, class: EntityClass) -> Result<i64, IdGenError>;
}

/// Builds the generator selected by config.
pub fn generator_for(strategy: IdStrategy, probe: ProbeConfig) -> Box<dyn IdGenerator> {
    match strategy {
        IdStrategy::Sequence => Box::new(SequenceIdGenerator::new()),
        IdStrategy::Probe => Box::new(ProbeIdGenerator::new(probe)),
    }
}

/// `MAX(id) + 1` over all rows of the class, tombstones included.
///
/// Collision-free as long as every writer holds the write transaction
/// while generating and inserting.
#[derive(Debug, Default)]
pub struct SequenceIdGenerator {
    high_water: HashMap<EntityClass, i64>,
}

impl SequenceIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequenceIdGenerator {
    fn generate(&mut self, conn: &Connection, class: EntityClass) -> Result<i64, IdGenError> {
        let persisted_max: i64 = conn.query_row(
            &format!("SELECT COALESCE(MAX(id), 0) FROM {};", class.table()),
            [],
            |row| row.get(0),
        )?;
        let issued_max = self.high_water.get(&class).copied().unwrap_or(0);
        let next = persisted_max.max(issued_max) + 1;
        self.high_water.insert(class, next);
        Ok(next)
    }
}

/// Random candidate in `[1, id_space)`, existence check, retry.
///
/// With the default id space of 2^53 the chance that one draw collides
/// stays below `rows / 2^53`, so the retry budget is never reached in
/// practice.
#[derive(Debug)]
pub struct ProbeIdGenerator {
    config: ProbeConfig,
    issued: HashSet<(EntityClass, i64)>,
}

impl ProbeIdGenerator {
    pub fn new(config: ProbeConfig) -> Self {
        Self {
            config,
            issued: HashSet::new(),
        }
    }

    fn draw(&self) -> i64 {
        let span = (self.config.id_space - 1).max(1) as u128;
        (Uuid::new_v4().as_u128() % span) as i64 + 1
    }
}

impl IdGenerator for ProbeIdGenerator {
    fn generate(&mut self, conn: &Connection, class: EntityClass) -> Result<i64, IdGenError> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1);",
            class.table()
        );
        for attempt in 1..=self.config.retry_budget {
            let candidate = self.draw();
            if self.issued.contains(&(class, candidate)) {
                continue;
            }
            let exists: i64 = conn.query_row(&sql, [candidate], |row| row.get(0))?;
            if exists == 0 {
                self.issued.insert((class, candidate));
                return Ok(candidate);
            }
            if attempt > 1 {
                warn!(
                    "event=id_generate module=reconcile status=retry class={class} attempt={attempt}"
                );
            }
        }

        Err(IdGenError::Exhausted {
            class,
            attempts: self.config.retry_budget,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{EntityClass, IdGenError, IdGenerator, ProbeIdGenerator, SequenceIdGenerator};
    use crate::config::ProbeConfig;
    use crate::db::open_db_in_memory;
    use rusqlite::Connection;
    use std::collections::HashSet;

    fn seed_shift_type(conn: &Connection, id: i64, removed: bool) {
        conn.execute(
            "INSERT INTO shift_types (id, name, removed) VALUES (?1, 'seed', ?2);",
            rusqlite::params![id, removed as i64],
        )
        .unwrap();
    }

    #[test]
    fn sequence_skips_tombstoned_ids() {
        let conn = open_db_in_memory().unwrap();
        seed_shift_type(&conn, 4, false);
        seed_shift_type(&conn, 9, true);

        let mut generator = SequenceIdGenerator::new();
        assert_eq!(
            generator.generate(&conn, EntityClass::ShiftType).unwrap(),
            10
        );
    }

    #[test]
    fn sequence_is_distinct_without_inserts() {
        let conn = open_db_in_memory().unwrap();
        let mut generator = SequenceIdGenerator::new();
        let ids: Vec<i64> = (0..5)
            .map(|_| generator.generate(&conn, EntityClass::ShiftTime).unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn probe_returns_distinct_ids_avoiding_seeded_rows() {
        let conn = open_db_in_memory().unwrap();
        let seeded: HashSet<i64> = (1..=50).collect();
        for id in &seeded {
            seed_shift_type(&conn, *id, *id % 2 == 0);
        }

        let mut generator = ProbeIdGenerator::new(ProbeConfig {
            id_space: 10_000,
            retry_budget: 64,
        });
        let mut seen = HashSet::new();
        for _ in 0..200 {
            let id = generator.generate(&conn, EntityClass::ShiftType).unwrap();
            assert!((1..10_000).contains(&id));
            assert!(!seeded.contains(&id));
            assert!(seen.insert(id), "duplicate id {id}");
        }
    }

    #[test]
    fn probe_exhausts_when_space_is_full() {
        let conn = open_db_in_memory().unwrap();
        seed_shift_type(&conn, 1, true);

        let mut generator = ProbeIdGenerator::new(ProbeConfig {
            id_space: 2,
            retry_budget: 3,
        });
        let err = generator
            .generate(&conn, EntityClass::ShiftType)
            .unwrap_err();
        assert!(matches!(
            err,
            IdGenError::Exhausted {
                class: EntityClass::ShiftType,
                attempts: 3
            }
        ));
    }
}
