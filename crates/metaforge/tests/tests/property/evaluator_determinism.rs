//! Property tests: evaluation is a pure function of its inputs and every
//! score stays inside the unit interval.

use metaforge_evaluator::ProposalEvaluator;
use metaforge_types::{
    BlueprintProposal, ChangeSpecification, ChangeType, ProposalId, PurposeCore, RiskLevel,
    SpecPayload, TargetComponent,
};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn arb_risk() -> impl Strategy<Value = RiskLevel> {
    prop_oneof![
        Just(RiskLevel::Safe),
        Just(RiskLevel::Moderate),
        Just(RiskLevel::High),
        Just(RiskLevel::Experimental),
    ]
}

fn arb_change() -> impl Strategy<Value = ChangeType> {
    prop_oneof![
        Just(ChangeType::Add),
        Just(ChangeType::Modify),
        Just(ChangeType::Delete),
        Just(ChangeType::Merge),
    ]
}

fn arb_component() -> impl Strategy<Value = TargetComponent> {
    prop_oneof![
        Just(TargetComponent::Memory),
        Just(TargetComponent::Agent),
        Just(TargetComponent::Protocol),
        Just(TargetComponent::Architecture),
        Just(TargetComponent::Purpose),
    ]
}

#[allow(clippy::too_many_arguments)]
fn build_proposal(
    component: TargetComponent,
    change: ChangeType,
    risk: RiskLevel,
    alignment: f64,
    impact: f64,
    priority: f64,
    dependency_count: usize,
    description: String,
) -> BlueprintProposal {
    let mut builder = BlueprintProposal::builder("prop-tester", component, change)
        .specification(ChangeSpecification::new(
            "component/path",
            SpecPayload::Document(serde_json::json!({"note": "change"})),
        ))
        .description(description)
        .priority(priority)
        .risk(risk)
        .purpose_alignment(alignment)
        .expected_impact(impact);
    for _ in 0..dependency_count {
        builder = builder.depends_on(ProposalId::new());
    }
    builder.build()
}

proptest! {
    #[test]
    fn evaluation_is_deterministic(
        component in arb_component(),
        change in arb_change(),
        risk in arb_risk(),
        alignment in 0.0f64..=1.0,
        impact in -1.0f64..=1.0,
        priority in 0.0f64..=1.0,
        dependency_count in 0usize..8,
        description in "[a-z ]{0,60}",
    ) {
        let evaluator = ProposalEvaluator::new();
        let purpose = PurposeCore::new("maintain coherent durable memory")
            .with_value("clarity of recall");
        let proposal = build_proposal(
            component, change, risk, alignment, impact, priority,
            dependency_count, description,
        );

        let first = evaluator.evaluate(&proposal, &purpose);
        let second = evaluator.evaluate(&proposal, &purpose);

        prop_assert_eq!(first.approved, second.approved);
        prop_assert_eq!(first.overall, second.overall);
        prop_assert_eq!(first.axes, second.axes);
        prop_assert_eq!(first.explanation, second.explanation);
        prop_assert_eq!(first.recommendations, second.recommendations);
    }

    #[test]
    fn scores_stay_in_unit_range(
        component in arb_component(),
        change in arb_change(),
        risk in arb_risk(),
        alignment in 0.0f64..=1.0,
        impact in -1.0f64..=1.0,
        dependency_count in 0usize..12,
        description in "[a-z ]{0,60}",
    ) {
        let evaluator = ProposalEvaluator::new();
        let purpose = PurposeCore::new("maintain coherent durable memory");
        let proposal = build_proposal(
            component, change, risk, alignment, impact, 0.5,
            dependency_count, description,
        );
        let result = evaluator.evaluate(&proposal, &purpose);

        for score in [
            result.axes.purpose,
            result.axes.feasibility,
            result.axes.risk,
            result.axes.resonance,
            result.overall,
        ] {
            prop_assert!((0.0..=1.0).contains(&score), "score out of range: {}", score);
        }
    }

    #[test]
    fn approval_implies_the_three_gates(
        component in arb_component(),
        change in arb_change(),
        risk in arb_risk(),
        alignment in 0.0f64..=1.0,
        impact in -1.0f64..=1.0,
        description in "[a-z ]{0,60}",
    ) {
        let evaluator = ProposalEvaluator::new();
        let purpose = PurposeCore::new("maintain coherent durable memory");
        let proposal = build_proposal(component, change, risk, alignment, impact, 0.5, 0, description);
        let result = evaluator.evaluate(&proposal, &purpose);

        if result.approved {
            prop_assert!(result.overall >= 0.7);
            prop_assert!(result.axes.purpose >= 0.6);
            prop_assert!(result.axes.risk >= 0.5);
        }
    }
}
