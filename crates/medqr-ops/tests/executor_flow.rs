//! End-to-end executor scenarios over the public API.

use medqr_core::{EntityType, ScannedEntity};
use medqr_ops::{
    DeviceRecord, DeviceStatus, DomainStore, ExecutionStatus, HandlerRegistry, InMemoryDomain,
    InMemoryExecutionStore, OperationCatalog, OperationDefinition, OperationExecutor,
    OperationStep, OpsError, PatientRecord,
};
use std::sync::Arc;

fn scan(entity_type: EntityType, id: &str) -> ScannedEntity {
    ScannedEntity::new(entity_type, id)
}

async fn seeded_executor() -> (OperationExecutor, Arc<InMemoryDomain>) {
    let registry = HandlerRegistry::standard();
    let catalog = OperationCatalog::standard(&registry).unwrap();
    let domain = Arc::new(InMemoryDomain::new());
    domain
        .seed(|state| {
            state
                .devices
                .insert("d5".to_string(), DeviceRecord::new("d5", "Infusion Pump"));
            state
                .patients
                .insert("p2".to_string(), PatientRecord::new("p2", "Roe"));
        })
        .await;
    let executor = OperationExecutor::new(
        catalog,
        registry,
        Arc::new(InMemoryExecutionStore::new()),
        domain.clone(),
    );
    (executor, domain)
}

#[tokio::test]
async fn scan_sequence_runs_usage_operation_to_completion() {
    let (executor, domain) = seeded_executor().await;
    let entities = vec![
        scan(EntityType::User, "u1"),
        scan(EntityType::Device, "d5"),
        scan(EntityType::Patient, "p2"),
    ];

    let definition = executor.match_operation(&entities).unwrap().clone();
    let receipt = executor
        .execute_operation(&definition, None, "u1", entities)
        .await
        .unwrap();

    assert_eq!(receipt.execution.status, ExecutionStatus::Completed);
    let state = domain.snapshot().await;
    assert_eq!(state.device("d5").unwrap().status, DeviceStatus::InUse);
    assert_eq!(
        state.device("d5").unwrap().current_patient.as_deref(),
        Some("p2")
    );
    assert_eq!(state.usage_logs.len(), 1);
    assert_eq!(state.usage_logs[0].used_by, "u1");
}

#[tokio::test]
async fn generic_handler_must_be_bound_explicitly() {
    let registry = HandlerRegistry::standard();
    let custom = OperationDefinition::new(
        "WARD_ROUND",
        "Ward Round",
        vec![
            OperationStep::required(EntityType::User),
            OperationStep::required(EntityType::Patient),
        ],
    )
    .auto();

    // Unknown code is rejected at catalogue construction...
    let err = OperationCatalog::new(vec![custom.clone()], &registry).unwrap_err();
    assert!(matches!(err, OpsError::UnknownOperationCode { .. }));

    // ...until the code is bound to the generic recorder.
    let mut registry = HandlerRegistry::standard();
    registry.register_generic("WARD_ROUND");
    let catalog = OperationCatalog::new(vec![custom], &registry).unwrap();

    let (_, domain) = seeded_executor().await;
    let executor = OperationExecutor::new(
        catalog,
        registry,
        Arc::new(InMemoryExecutionStore::new()),
        domain,
    );
    let definition = executor.catalog().get("WARD_ROUND").unwrap().clone();
    let receipt = executor
        .execute_operation(
            &definition,
            None,
            "u1",
            vec![scan(EntityType::User, "u1"), scan(EntityType::Patient, "p2")],
        )
        .await
        .unwrap();
    assert_eq!(receipt.execution.status, ExecutionStatus::Completed);
    assert!(receipt.execution.result_data.contains_key("entities"));
}

#[tokio::test]
async fn usage_of_busy_device_rolls_back_and_records_failure() {
    let (executor, domain) = seeded_executor().await;
    domain
        .seed(|state| {
            state.device_mut("d5").unwrap().status = DeviceStatus::UnderMaintenance;
        })
        .await;

    let entities = vec![
        scan(EntityType::User, "u1"),
        scan(EntityType::Device, "d5"),
        scan(EntityType::Patient, "p2"),
    ];
    let definition = executor.match_operation(&entities).unwrap().clone();
    let err = executor
        .execute_operation(&definition, None, "u1", entities)
        .await
        .unwrap_err();

    let OpsError::ExecutionFailed { execution_id, message } = err else {
        panic!("expected ExecutionFailed");
    };
    assert!(message.contains("not available"));

    let row = executor.get_execution(execution_id).await.unwrap();
    assert_eq!(row.status, ExecutionStatus::Failed);
    assert!(domain.snapshot().await.usage_logs.is_empty());
}
