mod common;

use common::{n, Fixture};
use csr_checkpoints::ErrorKind;
use csr_store::{CheckpointStorage, ProgramStorage};
use csr_types::{CheckpointStatus, ProgramStatus};
use proptest::prelude::*;

#[derive(Debug, Clone, Copy)]
enum Op {
    Trigger(u8),
    Acknowledge(u8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u8..=5).prop_map(Op::Trigger),
        (1u8..=5).prop_map(Op::Acknowledge),
    ]
}

fn expected_program_status(model: &[CheckpointStatus; 5]) -> ProgramStatus {
    let completed = model
        .iter()
        .take(4)
        .take_while(|s| **s == CheckpointStatus::Completed)
        .count();
    match completed {
        0 => ProgramStatus::Draft,
        1 => ProgramStatus::Approved,
        2 => ProgramStatus::ImplementationInProgress,
        3 => ProgramStatus::MidProgramReviewCompleted,
        _ => ProgramStatus::Completed,
    }
}

async fn run(ops: Vec<Op>) {
    let fx = Fixture::new().await;
    let mut model = [CheckpointStatus::Pending; 5];

    for op in ops {
        match op {
            Op::Trigger(i) => {
                let idx = (i - 1) as usize;
                let allowed = model[idx] == CheckpointStatus::Pending
                    && (idx == 0 || model[idx - 1] == CheckpointStatus::Completed);
                let result = fx.service.trigger(&fx.program_id, n(i), &fx.admin).await;
                if allowed {
                    assert!(result.is_ok(), "trigger {} should succeed", i);
                    model[idx] = CheckpointStatus::Ready;
                } else {
                    assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidTransition);
                }
            }
            Op::Acknowledge(i) => {
                let idx = (i - 1) as usize;
                let allowed = model[idx] == CheckpointStatus::Ready;
                let result = fx.service.acknowledge(&fx.program_id, n(i), &fx.owner).await;
                if allowed {
                    assert!(result.is_ok(), "acknowledge {} should succeed", i);
                    model[idx] = CheckpointStatus::Completed;
                } else {
                    assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidTransition);
                }
            }
        }
    }

    let stored: Vec<CheckpointStatus> = fx
        .storage
        .list_checkpoints(&fx.program_id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.status)
        .collect();
    assert_eq!(stored, model.to_vec());

    // completed prefix, at most one ready, pending tail
    let completed = stored
        .iter()
        .take_while(|s| **s == CheckpointStatus::Completed)
        .count();
    let ready = stored[completed..]
        .iter()
        .take_while(|s| **s == CheckpointStatus::Ready)
        .count();
    assert!(ready <= 1);
    assert!(stored[completed + ready..]
        .iter()
        .all(|s| *s == CheckpointStatus::Pending));

    let program = fx.storage.get_program(&fx.program_id).await.unwrap().unwrap();
    assert_eq!(program.status, expected_program_status(&model));

    let progress = fx.service.status(&fx.program_id).await.unwrap();
    assert_eq!(progress.completed_checkpoints, completed);
    assert_eq!(progress.current_checkpoint.is_some(), ready == 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn checkpoint_sequences_respect_ordering(ops in prop::collection::vec(op_strategy(), 0..24)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(run(ops));
    }
}
