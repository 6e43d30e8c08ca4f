//! Plan validation
//!
//! Walks a plan against a simulated copy of the enclave and reports every
//! precondition that would fail, instead of stopping at the first one. The
//! simulation starts from a snapshot of the live model, so services that
//! already exist in the enclave count as known.
//!
//! Image availability is checked separately: every distinct image is probed
//! once, with bounded parallelism, and a failure is attributed to the first
//! instruction that uses the image. The final list is ordered by
//! instruction number regardless of which probe finished first.

use std::collections::HashSet;

use enclave_core::apply::apply;
use enclave_core::errors::{ExError, ExErrorKind, NetworkError};
use enclave_core::instruction::{Instruction, RepartitionSpec};
use enclave_core::model::ServiceIdSet;
use enclave_core::ops::NetworkState;
use enclave_core::plan::Plan;
use enclave_core::rules::invariants::{
    find_overlapping_services, find_unknown_connection_partitions, find_unknown_members,
};
use enclave_core_types::schema::{FIELD_ERROR_COUNT, FIELD_PLAN_LEN};
use futures::stream::{self, StreamExt};

use crate::backend::ImageProbe;
use crate::cancel::Cancellation;
use crate::errors::ValidationError;

pub struct Validator<'a, P: ImageProbe + ?Sized> {
    probe: &'a P,
    parallelism: usize,
}

impl<'a, P: ImageProbe + ?Sized> Validator<'a, P> {
    /// `parallelism` is the number of concurrent image checks; 0 is treated as 1
    pub fn new(probe: &'a P, parallelism: usize) -> Self {
        Self {
            probe,
            parallelism: parallelism.max(1),
        }
    }

    /// All problems found in `plan`, ordered by instruction number
    ///
    /// An empty list means the plan is expected to run. Cancellation stops
    /// the walk, skips image checks and appends a `Cancelled` error.
    pub async fn validate(
        &self,
        plan: &Plan,
        environment: NetworkState,
        cancel: &Cancellation,
    ) -> Vec<ValidationError> {
        let (mut errors, completed) = walk(plan, environment, cancel);
        if completed {
            errors.extend(self.check_images(plan).await);
        }
        errors.sort_by_key(ValidationError::instruction_number);
        tracing::debug!(
            { FIELD_PLAN_LEN } = plan.len(),
            { FIELD_ERROR_COUNT } = errors.len(),
            "plan validated"
        );
        errors
    }

    async fn check_images(&self, plan: &Plan) -> Vec<ValidationError> {
        let mut seen = HashSet::new();
        let images: Vec<(u32, String)> = plan
            .numbered()
            .filter_map(|(number, planned)| {
                planned
                    .instruction
                    .image()
                    .filter(|image| seen.insert(image.to_string()))
                    .map(|image| (number, image.to_string()))
            })
            .collect();

        let mut failures: Vec<(u32, String, ExError)> = stream::iter(images)
            .map(|(number, image)| async move {
                let result = self.probe.check_image(&image).await;
                (number, image, result)
            })
            .buffer_unordered(self.parallelism)
            .filter_map(|(number, image, result)| async move {
                result.err().map(|e| (number, image, ExError::from(e)))
            })
            .collect()
            .await;
        failures.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));

        failures
            .into_iter()
            .map(|(number, image, cause)| {
                ValidationError::new(
                    number,
                    ExErrorKind::ImageUnavailable,
                    format!("image '{}' is not available: {}", image, cause.message()),
                )
                .with_cause(cause)
            })
            .collect()
    }
}

/// Simulate the plan; returns the errors and whether the walk finished
fn walk(
    plan: &Plan,
    mut simulated: NetworkState,
    cancel: &Cancellation,
) -> (Vec<ValidationError>, bool) {
    let mut errors = Vec::new();
    for (number, planned) in plan.numbered() {
        if cancel.is_cancelled() {
            errors.push(ValidationError::new(
                number,
                ExErrorKind::Cancelled,
                "validation cancelled",
            ));
            return (errors, false);
        }
        let instruction = &planned.instruction;

        if let Instruction::Repartition(spec) = instruction {
            let problems = repartition_problems(spec, &simulated);
            if !problems.is_empty() {
                errors.extend(
                    problems
                        .into_iter()
                        .map(|e| ValidationError::from_network(number, e)),
                );
                continue;
            }
        }

        match apply(&mut simulated, instruction) {
            Ok(_) => {
                if let Some(error) = undeclared_port(number, instruction, &simulated) {
                    errors.push(error);
                }
            }
            Err(err) => errors.push(ValidationError::from_network(number, err)),
        }
    }
    (errors, true)
}

/// Every reason a repartition would be refused, not only the first
fn repartition_problems(spec: &RepartitionSpec, simulated: &NetworkState) -> Vec<NetworkError> {
    if !simulated.partitioning_enabled() {
        return vec![NetworkError::PartitioningDisabled];
    }
    let known: ServiceIdSet = simulated.service_ids();
    let mut problems: Vec<NetworkError> = find_overlapping_services(&spec.partitions)
        .into_iter()
        .map(|(service_id, first, second)| NetworkError::PartitionOverlap {
            service_id: service_id.to_string(),
            first: first.to_string(),
            second: second.to_string(),
        })
        .collect();
    problems.extend(
        find_unknown_members(&spec.partitions, &known)
            .into_iter()
            .map(
                |(service_id, partition_id)| NetworkError::UnknownServiceInPartition {
                    service_id: service_id.to_string(),
                    partition_id: partition_id.to_string(),
                },
            ),
    );
    problems.extend(
        find_unknown_connection_partitions(spec.connections.keys(), &spec.partitions)
            .into_iter()
            .map(|partition_id| NetworkError::UnknownPartition {
                partition_id: partition_id.to_string(),
            }),
    );
    problems
}

fn undeclared_port(
    number: u32,
    instruction: &Instruction,
    simulated: &NetworkState,
) -> Option<ValidationError> {
    let Instruction::WaitForHttpEndpoint {
        service_id, port, ..
    } = instruction
    else {
        return None;
    };
    let record = simulated.service(service_id)?;
    if record.ports.values().any(|p| p.number == *port) {
        return None;
    }
    Some(
        ValidationError::new(
            number,
            ExErrorKind::UndeclaredPort,
            format!(
                "port {} is not declared by service '{}'",
                port, service_id
            ),
        )
        .with_cause(
            ExError::new(ExErrorKind::UndeclaredPort)
                .with_op("validate")
                .with_entity_id(service_id.to_string()),
        ),
    )
}
