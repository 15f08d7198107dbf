#[cfg(test)]
mod tests {
    use crate::error::ControllerError;
    use crate::reconciler::pool_selection::{is_control_plane, selection_criteria};
    use crate::test_utils::*;
    use crds::labels::{CONTROL_PLANE, IP_POOL_GROUP, IP_POOL_NAME, TEMPLATE_CLONED_FROM_NAME};
    use crds::{Cluster, Machine, VSphereMachine};
    use serde_json::json;
    use std::collections::BTreeMap;

    const WORKER: &str = "c1-md-0-x7k2p";

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn machine(control_plane: bool) -> Machine {
        serde_yaml::from_str(&machine_yaml(WORKER, control_plane, None)).unwrap()
    }

    fn vm(extra_labels: &[(&str, &str)], annotations: &[(&str, &str)]) -> VSphereMachine {
        serde_json::from_value(vsphere_machine(WORKER, extra_labels, annotations, json!([static_device()])))
            .unwrap()
    }

    #[test]
    fn test_control_plane_label_on_either_object() {
        assert!(is_control_plane(&vm(&[(CONTROL_PLANE, "")], &[]), &machine(false)));
        assert!(is_control_plane(&vm(&[], &[]), &machine(true)));
        assert!(!is_control_plane(&vm(&[], &[]), &machine(false)));
    }

    #[test]
    fn test_template_labels_overlay_resource_labels() {
        let resource = labels(&[(IP_POOL_GROUP, "rack-a"), ("team", "infra")]);
        let template = labels(&[(IP_POOL_GROUP, "rack-b")]);

        let criteria = selection_criteria(Some(&resource), Some(&template));
        assert_eq!(criteria[IP_POOL_GROUP], "rack-b");
        assert_eq!(criteria["team"], "infra");
    }

    #[test]
    fn test_resource_pool_name_wins_over_template() {
        let resource = labels(&[(IP_POOL_NAME, "pinned")]);
        let template = labels(&[(IP_POOL_NAME, "from-template")]);

        let criteria = selection_criteria(Some(&resource), Some(&template));
        assert_eq!(criteria[IP_POOL_NAME], "pinned");

        let criteria = selection_criteria(None, Some(&template));
        assert_eq!(criteria[IP_POOL_NAME], "from-template");
        assert!(selection_criteria(None, None).is_empty());
    }

    #[tokio::test]
    async fn test_worker_template_from_annotation() {
        let env = TestEnv::new();
        env.store.insert_yaml(&machine_template_yaml("c1-md-template", ""));
        let cloned = vm(&[], &[(TEMPLATE_CLONED_FROM_NAME, "c1-md-template")]);

        let template = env.reconciler.worker_template(&cloned, &machine(false)).await.unwrap();
        assert_eq!(template.metadata.name.as_deref(), Some("c1-md-template"));
        assert_eq!(template.devices()[0].nameservers, vec!["1.2.3.4".to_string()]);
    }

    #[tokio::test]
    async fn test_worker_template_from_machine_deployment() {
        let env = TestEnv::new();
        env.store.insert_yaml(&machine_template_yaml("c1-md-template", ""));
        env.store.insert_yaml(&machine_deployment_yaml("c1-md-0", "c1-md-template"));
        let machine: Machine =
            serde_yaml::from_str(&machine_yaml(WORKER, false, Some("c1-md-0"))).unwrap();

        let template = env.reconciler.worker_template(&vm(&[], &[]), &machine).await.unwrap();
        assert_eq!(template.metadata.name.as_deref(), Some("c1-md-template"));
    }

    #[tokio::test]
    async fn test_worker_template_missing_is_none() {
        let env = TestEnv::new();
        let cloned = vm(&[], &[(TEMPLATE_CLONED_FROM_NAME, "gone")]);
        assert!(env.reconciler.worker_template(&cloned, &machine(false)).await.is_none());

        let deployed: Machine =
            serde_yaml::from_str(&machine_yaml(WORKER, false, Some("c1-md-0"))).unwrap();
        assert!(env.reconciler.worker_template(&vm(&[], &[]), &deployed).await.is_none());
    }

    #[tokio::test]
    async fn test_control_plane_template_resolves_through_kcp() {
        let env = TestEnv::new();
        env.store.insert_yaml(&control_plane_yaml("c1-cp-template"));
        env.store
            .insert_yaml(&machine_template_yaml("c1-cp-template", &format!("    {IP_POOL_GROUP}: rack-a\n")));
        let cluster: Cluster = serde_yaml::from_str(&cluster_yaml()).unwrap();

        let template = env.reconciler.control_plane_template(&cluster).await.unwrap();
        let template_labels = template.metadata.labels.unwrap();
        assert_eq!(template_labels[IP_POOL_GROUP], "rack-a");
    }

    #[tokio::test]
    async fn test_control_plane_template_needs_labelled_kcp() {
        let env = TestEnv::new();
        let mut kcp: serde_json::Value =
            serde_yaml::from_str(&control_plane_yaml("c1-cp-template")).unwrap();
        kcp["metadata"]["labels"] = json!({});
        env.store.insert(kcp);
        env.store.insert_yaml(&machine_template_yaml("c1-cp-template", ""));
        let cluster: Cluster = serde_yaml::from_str(&cluster_yaml()).unwrap();

        let err = env.reconciler.control_plane_template(&cluster).await.unwrap_err();
        assert!(matches!(err, ControllerError::TemplateLookup { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_control_plane_template_needs_infrastructure_ref() {
        let env = TestEnv::new();
        let mut kcp: serde_json::Value =
            serde_yaml::from_str(&control_plane_yaml("c1-cp-template")).unwrap();
        kcp["spec"]["machineTemplate"] = json!({});
        env.store.insert(kcp);
        let cluster: Cluster = serde_yaml::from_str(&cluster_yaml()).unwrap();

        let err = env.reconciler.control_plane_template(&cluster).await.unwrap_err();
        assert!(matches!(err, ControllerError::TemplateLookup { .. }), "{err}");
    }
}
