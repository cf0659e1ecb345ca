//! Ties definitions, handlers, the execution ledger and the domain unit
//! together.

use crate::definition::{OperationCatalog, OperationDefinition};
use crate::domain::{DomainState, DomainStore, LogRef, UnitOutcome};
use crate::error::{OpsError, OpsResult};
use crate::execution::{ExecutionStatus, ExecutionStore, OperationExecution};
use crate::handlers::{HandlerRegistry, HandlerReport};
use medqr_core::{EntityType, ScannedEntity};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// An execution row plus the human-facing message for the caller.
#[derive(Debug, Clone)]
pub struct ExecutionReceipt {
    pub execution: OperationExecution,
    pub message: String,
}

pub struct OperationExecutor {
    catalog: OperationCatalog,
    registry: HandlerRegistry,
    executions: Arc<dyn ExecutionStore>,
    domain: Arc<dyn DomainStore>,
}

impl OperationExecutor {
    pub fn new(
        catalog: OperationCatalog,
        registry: HandlerRegistry,
        executions: Arc<dyn ExecutionStore>,
        domain: Arc<dyn DomainStore>,
    ) -> Self {
        Self {
            catalog,
            registry,
            executions,
            domain,
        }
    }

    pub fn catalog(&self) -> &OperationCatalog {
        &self.catalog
    }

    /// First matching active definition, in catalogue order.
    pub fn match_operation(&self, entities: &[ScannedEntity]) -> OpsResult<&OperationDefinition> {
        self.catalog
            .match_operation(entities)
            .ok_or(OpsError::NoMatchedOperation)
    }

    /// Execute (or stage) a matched operation.
    ///
    /// Definitions that require confirmation, or that are not auto-executing,
    /// produce a `Pending` row and touch no domain record. Auto-executing
    /// definitions run their unit before returning.
    pub async fn execute_operation(
        &self,
        definition: &OperationDefinition,
        session_id: Option<Uuid>,
        executed_by: &str,
        entities: Vec<ScannedEntity>,
    ) -> OpsResult<ExecutionReceipt> {
        if definition.requires_confirmation {
            let execution = OperationExecution::new(
                &definition.code,
                session_id,
                executed_by,
                entities,
                ExecutionStatus::Pending,
            );
            info!(
                execution_id = %execution.id,
                code = %definition.code,
                "operation staged, awaiting confirmation"
            );
            self.executions.insert(execution.clone()).await;
            return Ok(ExecutionReceipt {
                execution,
                message: "Operation requires confirmation".to_string(),
            });
        }

        if definition.auto_execute {
            let execution = OperationExecution::new(
                &definition.code,
                session_id,
                executed_by,
                entities,
                ExecutionStatus::InProgress,
            );
            return self.perform(execution, definition).await;
        }

        let execution = OperationExecution::new(
            &definition.code,
            session_id,
            executed_by,
            entities,
            ExecutionStatus::Pending,
        );
        self.executions.insert(execution.clone()).await;
        Ok(ExecutionReceipt {
            execution,
            message: "Operation ready for execution".to_string(),
        })
    }

    /// Confirm a pending execution, replaying its stored scan snapshot.
    pub async fn confirm_execution(
        &self,
        execution_id: Uuid,
        confirmed_by: &str,
    ) -> OpsResult<ExecutionReceipt> {
        let mut execution = self
            .executions
            .begin_confirm(execution_id)
            .await
            .ok_or(OpsError::AlreadyProcessed)?;
        let Some(definition) = self.catalog.get(&execution.operation_code) else {
            // The definition was removed or deactivated after staging. Fail
            // the row rather than leaving it in progress.
            let err = OpsError::unknown_code(&execution.operation_code);
            execution.status = ExecutionStatus::Failed;
            execution.error_message = Some(err.to_string());
            execution.completed_at = Some(OffsetDateTime::now_utc());
            self.executions.update(execution).await;
            return Err(err);
        };
        execution.executed_by = confirmed_by.to_string();
        debug!(execution_id = %execution_id, code = %execution.operation_code, "confirming execution");
        self.perform(execution, definition).await
    }

    /// Cancel a pending execution. No domain record is touched.
    pub async fn cancel_execution(&self, execution_id: Uuid) -> OpsResult<ExecutionReceipt> {
        let execution = self
            .executions
            .cancel_pending(execution_id)
            .await
            .ok_or(OpsError::AlreadyProcessed)?;
        info!(execution_id = %execution_id, "execution cancelled");
        Ok(ExecutionReceipt {
            execution,
            message: "Operation cancelled".to_string(),
        })
    }

    pub async fn get_execution(&self, execution_id: Uuid) -> Option<OperationExecution> {
        self.executions.get(execution_id).await
    }

    /// Run one execution as a single atomic unit: handler first, then the
    /// logs the definition's flags select. The execution row is written on
    /// both outcomes and is the only record that survives a failed unit.
    async fn perform(
        &self,
        mut execution: OperationExecution,
        definition: &OperationDefinition,
    ) -> OpsResult<ExecutionReceipt> {
        execution.status = ExecutionStatus::InProgress;
        self.executions.insert(execution.clone()).await;

        let handler = self
            .registry
            .get(&definition.code)
            .ok_or_else(|| OpsError::unknown_code(&definition.code))?;
        let def = definition.clone();
        let entities = execution.scanned_entities.clone();
        let executed_by = execution.executed_by.clone();

        let unit = self
            .domain
            .run_unit(Box::new(move |state| {
                let report = handler(state, &entities, &executed_by)?;
                let mut created_logs = report.created_logs.clone();
                created_logs.extend(create_logs(state, &def, &entities, &executed_by, &report)?);
                Ok(UnitOutcome {
                    result: report.into_map(),
                    created_logs,
                })
            }))
            .await;

        match unit {
            Ok(outcome) => {
                execution.status = ExecutionStatus::Completed;
                execution.result_data = outcome.result;
                execution.created_logs = outcome.created_logs;
                execution.completed_at = Some(OffsetDateTime::now_utc());
                self.executions.update(execution.clone()).await;
                info!(
                    execution_id = %execution.id,
                    code = %definition.code,
                    logs = execution.created_logs.len(),
                    "operation completed"
                );
                Ok(ExecutionReceipt {
                    execution,
                    message: format!("Operation '{}' executed successfully", definition.name),
                })
            }
            Err(err) => {
                let message = err.to_string();
                execution.status = ExecutionStatus::Failed;
                execution.error_message = Some(message.clone());
                execution.completed_at = Some(OffsetDateTime::now_utc());
                let execution_id = execution.id;
                self.executions.update(execution).await;
                warn!(
                    execution_id = %execution_id,
                    code = %definition.code,
                    error = %message,
                    "operation failed"
                );
                Err(OpsError::execution_failed(execution_id, message))
            }
        }
    }
}

fn find<'a>(entities: &'a [ScannedEntity], entity_type: EntityType) -> Option<&'a ScannedEntity> {
    entities.iter().find(|e| e.entity_type == entity_type)
}

/// Create the audit logs the definition's flags ask for. Runs inside the
/// execution's unit, after the handler.
fn create_logs(
    state: &mut DomainState,
    definition: &OperationDefinition,
    entities: &[ScannedEntity],
    executed_by: &str,
    report: &HandlerReport,
) -> OpsResult<Vec<LogRef>> {
    let mut logs = Vec::new();
    let device_id = find(entities, EntityType::Device).map(|e| e.entity_id.clone());

    if definition.log_usage {
        let device_id = device_id
            .clone()
            .ok_or_else(|| OpsError::validation("Usage log requires a device scan"))?;
        let patient_id = find(entities, EntityType::Patient).map(|e| e.entity_id.clone());
        logs.push(state.create_usage_log(device_id, patient_id, executed_by, &definition.name));
    }

    if definition.log_transfer {
        let device_id = device_id
            .clone()
            .ok_or_else(|| OpsError::validation("Transfer log requires a device scan"))?;
        let to_department = find(entities, EntityType::Department)
            .map(|e| e.entity_id.clone())
            .ok_or_else(|| OpsError::validation("Transfer log requires a department scan"))?;
        let from_department = report
            .extra
            .get("from_department")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        logs.push(state.create_transfer_log(
            device_id,
            from_department,
            to_department,
            executed_by,
            &definition.name,
        ));
    }

    if definition.log_handover {
        let device_id = device_id
            .ok_or_else(|| OpsError::validation("Handover log requires a device scan"))?;
        let scanned_users: Vec<&ScannedEntity> = entities
            .iter()
            .filter(|e| e.entity_type == EntityType::User)
            .collect();
        let [from_user, to_user, ..] = scanned_users.as_slice() else {
            return Err(OpsError::validation("Handover log requires two user scans"));
        };
        logs.push(state.create_handover_log(
            device_id,
            from_user.entity_id.clone(),
            to_user.entity_id.clone(),
            &definition.name,
        ));
    }

    Ok(logs)
}
