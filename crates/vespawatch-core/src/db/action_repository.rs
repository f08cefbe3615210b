//! Management action repository

use async_trait::async_trait;
use chrono::DateTime;
use libsql::{params, Connection, Row};

use crate::error::{Error, Result};
use crate::models::{
    ActionOutcome, Aftercare, ManagementAction, Method, NestSite, NestType, ObservationId, Product,
};

/// Trait for management action storage operations
#[async_trait]
pub trait ManagementActionRepository {
    /// Save an action for a nest; a second save replaces the first (one
    /// action per nest)
    async fn save(&self, action: &ManagementAction) -> Result<()>;

    /// Get the action recorded for a nest
    async fn get(&self, nest_id: &ObservationId) -> Result<Option<ManagementAction>>;

    /// Delete the action recorded for a nest
    async fn delete(&self, nest_id: &ObservationId) -> Result<()>;

    /// List all actions, newest first
    async fn list(&self) -> Result<Vec<ManagementAction>>;
}

/// libSQL implementation of `ManagementActionRepository`
pub struct LibSqlManagementActionRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlManagementActionRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_action(row: &Row) -> Result<ManagementAction> {
        let nest_id: String = row.get(0)?;
        let action_time_ms: i64 = row.get(8)?;

        Ok(ManagementAction {
            nest_id: nest_id
                .parse()
                .map_err(|_| Error::Database(format!("Invalid nest id: {nest_id}")))?,
            outcome: ActionOutcome::from_code(&row.get::<String>(1)?)?,
            site: row
                .get::<Option<String>>(2)?
                .map(|code| NestSite::from_code(&code))
                .transpose()?,
            nest_type: row
                .get::<Option<String>>(3)?
                .map(|code| NestType::from_code(&code))
                .transpose()?,
            aftercare: row
                .get::<Option<String>>(4)?
                .map(|code| Aftercare::from_code(&code))
                .transpose()?,
            product: row
                .get::<Option<String>>(5)?
                .map(|code| Product::from_code(&code))
                .transpose()?,
            method: row
                .get::<Option<String>>(6)?
                .map(|code| Method::from_code(&code))
                .transpose()?,
            user: row.get(7)?,
            action_time: DateTime::from_timestamp_millis(action_time_ms).ok_or_else(|| {
                Error::Database(format!("Invalid action timestamp: {action_time_ms}"))
            })?,
            duration_minutes: row.get::<Option<i64>>(9)?,
            number_of_persons: row.get::<Option<i32>>(10)?,
            comments: row.get(11)?,
            problems: Vec::new(),
        })
    }

    async fn problems(&self, nest_id: &ObservationId) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT problem FROM management_action_problems
                 WHERE nest_id = ? ORDER BY problem",
                params![nest_id.as_str()],
            )
            .await?;

        let mut problems = Vec::new();
        while let Some(row) = rows.next().await? {
            problems.push(row.get::<String>(0)?);
        }
        Ok(problems)
    }
}

#[async_trait]
impl ManagementActionRepository for LibSqlManagementActionRepository<'_> {
    async fn save(&self, action: &ManagementAction) -> Result<()> {
        self.conn.execute("BEGIN TRANSACTION", ()).await?;

        let write = async {
            self.conn
                .execute(
                    "INSERT OR REPLACE INTO management_actions (
                        nest_id, outcome, site, nest_type, aftercare, product, method,
                        user, action_time, duration_minutes, number_of_persons, comments
                     ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        action.nest_id.as_str(),
                        action.outcome.as_code(),
                        action.site.map(|site| site.as_code()),
                        action.nest_type.map(|nest_type| nest_type.as_code()),
                        action.aftercare.map(|aftercare| aftercare.as_code()),
                        action.product.map(|product| product.as_code()),
                        action.method.map(|method| method.as_code()),
                        action.user.clone(),
                        action.action_time.timestamp_millis(),
                        action.duration_minutes,
                        action.number_of_persons.map(i64::from),
                        action.comments.clone()
                    ],
                )
                .await?;

            self.conn
                .execute(
                    "DELETE FROM management_action_problems WHERE nest_id = ?",
                    params![action.nest_id.as_str()],
                )
                .await?;

            for problem in &action.problems {
                self.conn
                    .execute(
                        "INSERT OR IGNORE INTO management_action_problems (nest_id, problem)
                         VALUES (?, ?)",
                        params![action.nest_id.as_str(), problem.clone()],
                    )
                    .await?;
            }
            Ok::<(), Error>(())
        };

        if let Err(e) = write.await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(e);
        }
        self.conn.execute("COMMIT", ()).await?;
        Ok(())
    }

    async fn get(&self, nest_id: &ObservationId) -> Result<Option<ManagementAction>> {
        let mut rows = self
            .conn
            .query(
                "SELECT nest_id, outcome, site, nest_type, aftercare, product, method,
                        user, action_time, duration_minutes, number_of_persons, comments
                 FROM management_actions WHERE nest_id = ?",
                params![nest_id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => {
                let mut action = Self::parse_action(&row)?;
                action.problems = self.problems(nest_id).await?;
                Ok(Some(action))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, nest_id: &ObservationId) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM management_actions WHERE nest_id = ?",
                params![nest_id.as_str()],
            )
            .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ManagementAction>> {
        let mut rows = self
            .conn
            .query(
                "SELECT nest_id, outcome, site, nest_type, aftercare, product, method,
                        user, action_time, duration_minutes, number_of_persons, comments
                 FROM management_actions ORDER BY action_time DESC",
                (),
            )
            .await?;

        let mut actions = Vec::new();
        while let Some(row) = rows.next().await? {
            actions.push(Self::parse_action(&row)?);
        }
        for action in &mut actions {
            action.problems = self.problems(&action.nest_id).await?;
        }
        Ok(actions)
    }
}
