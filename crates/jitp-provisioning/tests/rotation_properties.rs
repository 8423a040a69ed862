//! Properties of policy rotation under arbitrary starting state.

use jitp_core::types::BootstrapScope;
use jitp_core::{AccountContext, DeviceId, PolicyDocument, PolicyName, Principal};
use jitp_provisioning::PolicyRotator;
use jitp_testkit::{MemoryControlPlane, Operation};
use proptest::prelude::*;
use std::sync::Arc;

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

fn principal(n: u8) -> Principal {
    Principal::new(format!("arn:aws:iot:us-east-2:111:cert/p{n}")).unwrap()
}

/// What the policy store looks like before rotation.
#[derive(Debug, Clone)]
enum Start {
    Absent,
    Present { targets: Vec<u8>, same_document: bool },
}

fn start() -> impl Strategy<Value = Start> {
    prop_oneof![
        Just(Start::Absent),
        (proptest::collection::vec(0u8..6, 0..5), any::<bool>())
            .prop_map(|(targets, same_document)| Start::Present { targets, same_document }),
    ]
}

async fn seeded(start: &Start, policy: &PolicyName, document: &PolicyDocument) -> Arc<MemoryControlPlane> {
    let control_plane = Arc::new(MemoryControlPlane::default());
    if let Start::Present {
        targets,
        same_document,
    } = start
    {
        let existing = if *same_document {
            document.clone()
        } else {
            PolicyDocument::bootstrap(BootstrapScope::Open)
        };
        control_plane
            .insert_policy(policy, existing, targets.iter().copied().map(principal))
            .await;
    }
    control_plane
}

fn inputs() -> (PolicyName, PolicyDocument, Principal) {
    let account = AccountContext::new("us-east-2", "111");
    let device = DeviceId::new("dev-42").unwrap();
    (
        PolicyName::for_device(&device),
        PolicyDocument::device_scoped(&account, &device),
        Principal::new("arn:aws:iot:us-east-2:111:cert/c1").unwrap(),
    )
}

proptest! {
    #[test]
    fn rotating_twice_equals_rotating_once(start in start()) {
        let (policy, document, target) = inputs();
        block_on(async {
            let once = seeded(&start, &policy, &document).await;
            PolicyRotator::new(Arc::clone(&once))
                .rotate(&policy, &document, &target)
                .await
                .unwrap();

            let twice = seeded(&start, &policy, &document).await;
            let rotator = PolicyRotator::new(Arc::clone(&twice));
            rotator.rotate(&policy, &document, &target).await.unwrap();
            rotator.rotate(&policy, &document, &target).await.unwrap();

            assert_eq!(once.policy(&policy).await, twice.policy(&policy).await);
            assert_eq!(once.policy_targets(&policy).await, twice.policy_targets(&policy).await);
            assert_eq!(twice.policy_targets(&policy).await, vec![target.clone()]);
            assert_eq!(twice.policy(&policy).await, Some(document.clone()));
        });
    }

    #[test]
    fn attach_follows_full_detach_and_delete(start in start()) {
        let (policy, document, target) = inputs();
        block_on(async {
            let control_plane = seeded(&start, &policy, &document).await;
            PolicyRotator::new(Arc::clone(&control_plane))
                .rotate(&policy, &document, &target)
                .await
                .unwrap();

            let operations = control_plane.operations().await;
            let create = operations
                .iter()
                .position(|op| *op == Operation::CreatePolicy)
                .unwrap();
            let attach = operations
                .iter()
                .position(|op| *op == Operation::AttachPolicy)
                .unwrap();
            assert_eq!(attach, operations.len() - 1);
            assert_eq!(create + 1, attach);
            // Every detach and the delete precede the create.
            assert!(operations[..create]
                .iter()
                .all(|op| matches!(op, Operation::ListTargetsForPolicy
                    | Operation::DetachPolicy
                    | Operation::DeletePolicy)));
            assert_eq!(operations[create - 1], Operation::DeletePolicy);
        });
    }
}

#[tokio::test]
async fn absent_policy_with_no_targets_rotates_cleanly() {
    let (policy, document, target) = inputs();
    let control_plane = Arc::new(MemoryControlPlane::default());

    PolicyRotator::new(Arc::clone(&control_plane))
        .rotate(&policy, &document, &target)
        .await
        .unwrap();

    assert_eq!(control_plane.policy(&policy).await, Some(document));
    assert_eq!(control_plane.policy_targets(&policy).await, vec![target]);
}
