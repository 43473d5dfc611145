//! Unit tests for debug host bootstrap data and launch parameters.

use std::collections::HashMap;

use skipper::identity::Identity;
use skipper::models::compute::{ComputeInstance, InstanceStatus};
use skipper::provision::{build_user_data, launch_spec_from_template};
use skipper::AppError;

const TASK_DEF: &str = "arn:aws:ecs:eu-west-1:1:task-definition/api:7";

fn template() -> ComputeInstance {
    ComputeInstance {
        id: "i-prod".into(),
        key_name: Some("prod-key".into()),
        private_address: Some("10.0.0.1".into()),
        tags: HashMap::new(),
        status: InstanceStatus::Running,
        image_id: Some("ami-ecs".into()),
        subnet_id: Some("subnet-a".into()),
        security_group_ids: vec!["sg-1".into()],
        iam_instance_profile: Some("arn:aws:iam::1:instance-profile/ecs".into()),
    }
}

#[test]
fn user_data_registers_node_with_group_attribute() {
    let script = build_user_data("DEBUG", "skipper-alice-api:7");
    assert_eq!(
        script,
        "#!/bin/bash\n\
         echo ECS_CLUSTER=DEBUG >> /etc/ecs/ecs.config\n\
         echo ECS_INSTANCE_ATTRIBUTES={\\\"group\\\": \\\"skipper-alice-api:7\\\"} >> /etc/ecs/ecs.config\n"
    );
}

#[test]
fn launch_spec_clones_template_placement() {
    let identity = Identity::new("alice").unwrap();
    let spec = launch_spec_from_template(&template(), "t2.large", "DEBUG", &identity, TASK_DEF)
        .expect("spec");

    assert_eq!(spec.image_id, "ami-ecs");
    assert_eq!(spec.subnet_id, "subnet-a");
    assert_eq!(spec.security_group_ids, vec!["sg-1".to_owned()]);
    assert_eq!(spec.iam_instance_profile, "arn:aws:iam::1:instance-profile/ecs");
    assert_eq!(spec.instance_type, "t2.large");
    assert_eq!(spec.key_name, "skipper-alice");
    assert_eq!(spec.name_tag, "skipper-alice-api:7");
    assert!(spec.user_data.contains("ECS_CLUSTER=DEBUG"));
}

#[test]
fn launch_spec_requires_image_subnet_and_profile() {
    let identity = Identity::new("alice").unwrap();
    for strip in 0..3 {
        let mut instance = template();
        match strip {
            0 => instance.image_id = None,
            1 => instance.subnet_id = None,
            _ => instance.iam_instance_profile = None,
        }
        let err = launch_spec_from_template(&instance, "t2.large", "DEBUG", &identity, TASK_DEF)
            .unwrap_err();
        assert!(matches!(err, AppError::Provisioning(ref msg) if msg.contains("i-prod")));
    }
}
