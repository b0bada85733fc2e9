//! Operator commands against the membership engine
//!
//! A `CommandRequest` is the wire shape handed over by the chat front end.
//! It is validated into a `Command` before anything is touched, so a bad
//! request never causes a partial mutation.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::backup::push_after_mutation;
use crate::clock::YearMonth;
use crate::context::MembershipContext;
use crate::error::{MembershipError, MembershipResult};
use crate::expiry::{allocate_revenue, extend_by_months, set_exact_days};
use crate::messages;
use crate::model::{AllocationRecord, MembershipRecord};
use crate::revenue::{aggregate, MonthlyTotal, RevenueFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandAction {
    /// Add paid months
    Add,
    /// Set expiry to an exact number of days from now
    Set,
    Remove,
    Check,
    List,
    Revenue,
}

/// Command as received from the front end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    pub action: CommandAction,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Months for `add`, days for `set`
    #[serde(default)]
    pub amount: Option<i64>,
    /// `YYYY-MM`, single-month revenue report
    #[serde(default)]
    pub month: Option<String>,
    /// `YYYY-MM`, start of a revenue range
    #[serde(default)]
    pub from: Option<String>,
    /// `YYYY-MM`, end of a revenue range
    #[serde(default)]
    pub to: Option<String>,
}

/// A validated command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    AddMonths { user_id: String, months: i64 },
    SetDays { user_id: String, days: i64 },
    Remove { user_id: String },
    Check { user_id: String },
    List,
    Revenue(RevenueFilter),
}

fn required_user(request: &CommandRequest) -> MembershipResult<String> {
    match request.user_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(MembershipError::InvalidArgument(
            "userId is required".to_string(),
        )),
    }
}

fn required_positive(request: &CommandRequest, what: &str) -> MembershipResult<i64> {
    match request.amount {
        Some(amount) if amount > 0 => Ok(amount),
        Some(amount) => Err(MembershipError::InvalidArgument(format!(
            "{} must be a positive integer, got {}",
            what, amount
        ))),
        None => Err(MembershipError::InvalidArgument(format!(
            "amount ({}) is required",
            what
        ))),
    }
}

fn revenue_filter(request: &CommandRequest) -> MembershipResult<RevenueFilter> {
    match (&request.month, &request.from, &request.to) {
        (None, None, None) => Ok(RevenueFilter::Upcoming),
        (Some(month), None, None) => Ok(RevenueFilter::Month {
            month: month.parse()?,
        }),
        (None, Some(from), Some(to)) => {
            let from: YearMonth = from.parse()?;
            let to: YearMonth = to.parse()?;
            if from > to {
                return Err(MembershipError::InvalidArgument(format!(
                    "range start {} is after range end {}",
                    from, to
                )));
            }
            Ok(RevenueFilter::Range { from, to })
        }
        _ => Err(MembershipError::InvalidArgument(
            "use either month, or both from and to".to_string(),
        )),
    }
}

impl TryFrom<CommandRequest> for Command {
    type Error = MembershipError;

    fn try_from(request: CommandRequest) -> Result<Self, Self::Error> {
        Ok(match request.action {
            CommandAction::Add => Command::AddMonths {
                user_id: required_user(&request)?,
                months: required_positive(&request, "months")?,
            },
            CommandAction::Set => Command::SetDays {
                user_id: required_user(&request)?,
                days: required_positive(&request, "days")?,
            },
            CommandAction::Remove => Command::Remove {
                user_id: required_user(&request)?,
            },
            CommandAction::Check => Command::Check {
                user_id: required_user(&request)?,
            },
            CommandAction::List => Command::List,
            CommandAction::Revenue => Command::Revenue(revenue_filter(&request)?),
        })
    }
}

/// Result of a command. Delivery, allocation and backup problems after the
/// membership write show up in `warnings`; they never fail the command itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CommandOutcome {
    Extended {
        record: MembershipRecord,
        extended_from_existing: bool,
        allocations: Vec<AllocationRecord>,
        warnings: Vec<String>,
    },
    Set {
        record: MembershipRecord,
        warnings: Vec<String>,
    },
    Removed {
        user_id: String,
        warnings: Vec<String>,
    },
    Found {
        record: MembershipRecord,
    },
    NotFound {
        user_id: String,
    },
    Members {
        records: Vec<MembershipRecord>,
    },
    Revenue {
        filter: RevenueFilter,
        totals: Vec<MonthlyTotal>,
    },
}

/// Execute a validated command
pub async fn handle_command(
    ctx: &MembershipContext,
    command: Command,
    now: i64,
) -> MembershipResult<CommandOutcome> {
    match command {
        Command::AddMonths { user_id, months } => add_months(ctx, user_id, months, now).await,
        Command::SetDays { user_id, days } => set_days(ctx, user_id, days, now).await,
        Command::Remove { user_id } => remove(ctx, user_id).await,
        Command::Check { user_id } => {
            let found = ctx.store.get(&user_id).await?;
            Ok(match found {
                Some(record) => CommandOutcome::Found { record },
                None => CommandOutcome::NotFound { user_id },
            })
        }
        Command::List => {
            let mut records = ctx.store.list_all().await?;
            records.sort_by(|a, b| {
                a.expiry_at
                    .cmp(&b.expiry_at)
                    .then_with(|| a.user_id.cmp(&b.user_id))
            });
            Ok(CommandOutcome::Members { records })
        }
        Command::Revenue(filter) => {
            let rows = ctx.store.query_allocations(&filter, now).await?;
            let totals = aggregate(&rows, &filter, now)?;
            Ok(CommandOutcome::Revenue { filter, totals })
        }
    }
}

async fn add_months(
    ctx: &MembershipContext,
    user_id: String,
    months: i64,
    now: i64,
) -> MembershipResult<CommandOutcome> {
    // Validates `months` before the store is touched
    let planned = allocate_revenue(now, months, ctx.settings.price_per_month)?;

    let from_existing = AtomicBool::new(false);
    let record = ctx
        .store
        .upsert_with(&user_id, &|current| {
            let extension = extend_by_months(current, months, now)?;
            from_existing.store(extension.extended_from_existing, Ordering::Relaxed);
            Ok(extension.into_record(user_id.as_str()))
        })
        .await?;

    // The extension is committed; from here on failures only produce warnings
    let mut warnings = Vec::new();
    let mut allocations = Vec::with_capacity(planned.len());
    for allocation in &planned {
        match ctx.store.insert_allocation(allocation).await {
            Ok(row) => allocations.push(row),
            Err(e) => {
                tracing::error!(
                    user_id = %user_id,
                    year = allocation.year,
                    month = allocation.month,
                    error = %e,
                    "Failed to record revenue allocation"
                );
                warnings.push(format!(
                    "revenue for {} not recorded: {}",
                    allocation.year_month(),
                    e
                ));
            }
        }
    }

    tracing::info!(
        user_id = %user_id,
        months = months,
        expiry_at = record.expiry_at,
        allocations = allocations.len(),
        "Prime months added"
    );

    grant_and_confirm(ctx, &record, &mut warnings).await;
    warnings.extend(push_after_mutation(ctx).await);

    Ok(CommandOutcome::Extended {
        record,
        extended_from_existing: from_existing.load(Ordering::Relaxed),
        allocations,
        warnings,
    })
}

async fn set_days(
    ctx: &MembershipContext,
    user_id: String,
    days: i64,
    now: i64,
) -> MembershipResult<CommandOutcome> {
    let extension = set_exact_days(now, days)?;
    let record = extension.into_record(user_id.as_str());
    ctx.store.upsert(&record).await?;

    tracing::info!(user_id = %user_id, days = days, expiry_at = record.expiry_at, "Prime expiry set");

    let mut warnings = Vec::new();
    grant_and_confirm(ctx, &record, &mut warnings).await;
    warnings.extend(push_after_mutation(ctx).await);

    Ok(CommandOutcome::Set { record, warnings })
}

async fn remove(ctx: &MembershipContext, user_id: String) -> MembershipResult<CommandOutcome> {
    if !ctx.store.delete(&user_id).await? {
        return Ok(CommandOutcome::NotFound { user_id });
    }

    tracing::info!(user_id = %user_id, "Prime membership removed");

    let mut warnings = Vec::new();
    if let Err(e) = ctx.roles.revoke(&user_id).await {
        tracing::warn!(user_id = %user_id, error = %e, "Failed to revoke Prime role");
        warnings.push(e.to_string());
    }
    warnings.extend(push_after_mutation(ctx).await);

    Ok(CommandOutcome::Removed { user_id, warnings })
}

async fn grant_and_confirm(ctx: &MembershipContext, record: &MembershipRecord, warnings: &mut Vec<String>) {
    if let Err(e) = ctx.roles.grant(&record.user_id).await {
        tracing::warn!(user_id = %record.user_id, error = %e, "Failed to grant Prime role");
        warnings.push(e.to_string());
    }

    if let Err(e) = ctx
        .notifier
        .send(&record.user_id, &messages::purchase_confirmation(record.expiry_at))
        .await
    {
        tracing::warn!(user_id = %record.user_id, error = %e, "Failed to send purchase confirmation");
        warnings.push(e.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{add_months as add_calendar_months, to_epoch_ms, DAY_MS};
    use crate::ports::MembershipStore;
    use crate::store::InMemoryStore;
    use crate::testing::{Harness, RecordingBackup, RecordingNotifier, RecordingRoles};
    use time::macros::datetime;

    fn now() -> i64 {
        to_epoch_ms(datetime!(2024-11-20 15:00 UTC))
    }

    fn request(action: CommandAction) -> CommandRequest {
        CommandRequest {
            action,
            user_id: None,
            amount: None,
            month: None,
            from: None,
            to: None,
        }
    }

    #[test]
    fn test_request_wire_format() {
        let request: CommandRequest =
            serde_json::from_str(r#"{"action":"add","userId":"42","amount":3}"#).unwrap();
        assert_eq!(
            Command::try_from(request).unwrap(),
            Command::AddMonths {
                user_id: "42".into(),
                months: 3
            }
        );
    }

    #[test]
    fn test_validation_rejects_bad_requests() {
        let mut add = request(CommandAction::Add);
        add.user_id = Some("42".into());
        assert!(Command::try_from(add.clone()).is_err(), "missing amount");

        add.amount = Some(0);
        assert!(Command::try_from(add.clone()).is_err(), "zero months");

        add.amount = Some(2);
        add.user_id = Some("   ".into());
        assert!(Command::try_from(add).is_err(), "blank user");

        let mut set = request(CommandAction::Set);
        set.user_id = Some("42".into());
        set.amount = Some(-5);
        assert!(matches!(
            Command::try_from(set),
            Err(MembershipError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_revenue_filter_parsing() {
        assert_eq!(
            Command::try_from(request(CommandAction::Revenue)).unwrap(),
            Command::Revenue(RevenueFilter::Upcoming)
        );

        let mut single = request(CommandAction::Revenue);
        single.month = Some("2025-02".into());
        assert_eq!(
            Command::try_from(single).unwrap(),
            Command::Revenue(RevenueFilter::Month {
                month: YearMonth::new(2025, 2).unwrap()
            })
        );

        let mut range = request(CommandAction::Revenue);
        range.from = Some("2025-03".into());
        range.to = Some("2025-01".into());
        assert!(Command::try_from(range.clone()).is_err(), "reversed range");

        range.to = None;
        assert!(Command::try_from(range).is_err(), "half-open range");
    }

    #[tokio::test]
    async fn test_add_creates_member_allocations_and_side_effects() {
        let h = Harness::new();

        let outcome = handle_command(
            &h.ctx,
            Command::AddMonths {
                user_id: "42".into(),
                months: 3,
            },
            now(),
        )
        .await
        .unwrap();

        let CommandOutcome::Extended {
            record,
            extended_from_existing,
            allocations,
            warnings,
        } = outcome
        else {
            panic!("expected Extended outcome");
        };
        assert_eq!(record.expiry_at, to_epoch_ms(datetime!(2025-02-20 15:00 UTC)));
        assert!(!extended_from_existing);
        assert!(warnings.is_empty());
        let months: Vec<(i32, u8)> = allocations.iter().map(|a| (a.year, a.month)).collect();
        assert_eq!(months, vec![(2024, 11), (2024, 12), (2025, 1)]);

        assert_eq!(h.roles.granted().await, vec!["42".to_string()]);
        assert_eq!(h.notifier.sent_to("42").await, 1);
        assert_eq!(h.backup.pushes().await, 1);
    }

    #[tokio::test]
    async fn test_add_stacks_on_active_membership_and_clears_warned() {
        let expiry = now() + 2 * DAY_MS;
        let h = Harness::with_members([MembershipRecord {
            user_id: "42".into(),
            expiry_at: expiry,
            warned: true,
        }]);

        let outcome = handle_command(
            &h.ctx,
            Command::AddMonths {
                user_id: "42".into(),
                months: 1,
            },
            now(),
        )
        .await
        .unwrap();

        let stored = h.store.get("42").await.unwrap().unwrap();
        assert_eq!(stored.expiry_at, add_calendar_months(expiry, 1).unwrap());
        assert!(!stored.warned);
        assert!(matches!(
            outcome,
            CommandOutcome::Extended {
                extended_from_existing: true,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_invalid_add_mutates_nothing() {
        let h = Harness::new();
        let result = handle_command(
            &h.ctx,
            Command::AddMonths {
                user_id: "42".into(),
                months: 0,
            },
            now(),
        )
        .await;

        assert!(matches!(result, Err(MembershipError::InvalidArgument(_))));
        assert_eq!(h.store.count().await.unwrap(), 0);
        let rows = h
            .store
            .query_allocations(&RevenueFilter::Upcoming, now())
            .await
            .unwrap();
        assert!(rows.is_empty());
        assert_eq!(h.backup.pushes().await, 0);
    }

    #[tokio::test]
    async fn test_oversized_add_rejected_before_any_write() {
        let h = Harness::with_members([MembershipRecord::new("42", now() + DAY_MS)]);
        let request: CommandRequest =
            serde_json::from_str(r#"{"action":"add","userId":"42","amount":4294967295}"#).unwrap();

        let result = handle_command(&h.ctx, Command::try_from(request).unwrap(), now()).await;

        assert!(matches!(result, Err(MembershipError::InvalidArgument(_))));
        assert_eq!(h.store.get("42").await.unwrap().unwrap().expiry_at, now() + DAY_MS);
        let rows = h
            .store
            .query_allocations(&RevenueFilter::Upcoming, now())
            .await
            .unwrap();
        assert!(rows.is_empty());
        assert!(h.roles.granted().await.is_empty());
        assert_eq!(h.backup.pushes().await, 0);
    }

    #[tokio::test]
    async fn test_allocation_failure_keeps_extension_and_side_effects() {
        let h = Harness::with_failing_allocations();

        let outcome = handle_command(
            &h.ctx,
            Command::AddMonths {
                user_id: "42".into(),
                months: 2,
            },
            now(),
        )
        .await
        .unwrap();

        let (record, allocations, warnings) = match outcome {
            CommandOutcome::Extended {
                record,
                allocations,
                warnings,
                ..
            } => (record, allocations, warnings),
            other => panic!("expected Extended, got {:?}", other),
        };
        assert_eq!(record.expiry_at, add_calendar_months(now(), 2).unwrap());
        assert!(allocations.is_empty());
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("2024-11"), "{:?}", warnings);
        assert!(h.store.get("42").await.unwrap().is_some());
        assert_eq!(h.roles.granted().await, vec!["42".to_string()]);
        assert_eq!(h.notifier.sent_to("42").await, 1);
        assert_eq!(h.backup.pushes().await, 1);
    }

    #[tokio::test]
    async fn test_set_overwrites_expiry() {
        let h = Harness::with_members([MembershipRecord {
            user_id: "42".into(),
            expiry_at: now() + 200 * DAY_MS,
            warned: true,
        }]);

        handle_command(
            &h.ctx,
            Command::SetDays {
                user_id: "42".into(),
                days: 7,
            },
            now(),
        )
        .await
        .unwrap();

        let stored = h.store.get("42").await.unwrap().unwrap();
        assert_eq!(stored.expiry_at, now() + 7 * DAY_MS);
        assert!(!stored.warned);
        // No revenue for manual adjustments
        let rows = h
            .store
            .query_allocations(&RevenueFilter::Upcoming, now())
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_delivery_failures_become_warnings() {
        let h = Harness::build(
            InMemoryStore::new(),
            RecordingRoles::failing_for(["42"]),
            RecordingNotifier::failing_for(["42"]),
            RecordingBackup::failing(),
        );

        let outcome = handle_command(
            &h.ctx,
            Command::SetDays {
                user_id: "42".into(),
                days: 30,
            },
            now(),
        )
        .await
        .unwrap();

        let CommandOutcome::Set { warnings, .. } = outcome else {
            panic!("expected Set outcome");
        };
        assert_eq!(warnings.len(), 3);
        assert!(h.store.get("42").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_remove_and_check() {
        let h = Harness::with_members([MembershipRecord::new("42", now() + DAY_MS)]);

        let found = handle_command(&h.ctx, Command::Check { user_id: "42".into() }, now())
            .await
            .unwrap();
        assert!(matches!(found, CommandOutcome::Found { .. }));

        let removed = handle_command(&h.ctx, Command::Remove { user_id: "42".into() }, now())
            .await
            .unwrap();
        assert!(matches!(removed, CommandOutcome::Removed { .. }));
        assert_eq!(h.roles.revoked().await, vec!["42".to_string()]);

        let missing = handle_command(&h.ctx, Command::Check { user_id: "42".into() }, now())
            .await
            .unwrap();
        assert_eq!(missing, CommandOutcome::NotFound { user_id: "42".into() });

        let again = handle_command(&h.ctx, Command::Remove { user_id: "42".into() }, now())
            .await
            .unwrap();
        assert_eq!(again, CommandOutcome::NotFound { user_id: "42".into() });
    }

    #[tokio::test]
    async fn test_list_orders_by_expiry() {
        let h = Harness::with_members([
            MembershipRecord::new("b", 300),
            MembershipRecord::new("a", 100),
            MembershipRecord::new("c", 200),
        ]);
        let outcome = handle_command(&h.ctx, Command::List, now()).await.unwrap();
        let CommandOutcome::Members { records } = outcome else {
            panic!("expected Members outcome");
        };
        let ids: Vec<&str> = records.iter().map(|r| r.user_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
    }

    #[tokio::test]
    async fn test_revenue_after_purchases() {
        let h = Harness::new();
        for user in ["1", "2"] {
            handle_command(
                &h.ctx,
                Command::AddMonths {
                    user_id: user.into(),
                    months: 2,
                },
                now(),
            )
            .await
            .unwrap();
        }

        let outcome = handle_command(&h.ctx, Command::Revenue(RevenueFilter::Upcoming), now())
            .await
            .unwrap();
        let CommandOutcome::Revenue { totals, .. } = outcome else {
            panic!("expected Revenue outcome");
        };
        let price = h.ctx.settings.price_per_month;
        assert_eq!(
            totals,
            vec![
                MonthlyTotal { year: 2024, month: 11, total: 2 * price },
                MonthlyTotal { year: 2024, month: 12, total: 2 * price },
                MonthlyTotal { year: 2025, month: 1, total: 0 },
            ]
        );
    }
}
