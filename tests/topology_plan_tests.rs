#[cfg(test)]
mod topology_plan_tests {
    use std::collections::HashSet;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    use harnet::config_loader::load_config;
    use harnet::emulation::{LinkImpairment, Network, RecordingRunner};
    use harnet::topology::{plan_topology, PlanOptions, TopologyPlan};

    const CONFIG: &str = r#"{
  "https://www.example.com:443": {
    "cmd": "./har-server.js page.har https://www.example.com:443 93.184.216.34",
    "ips": [{ "ip": "93.184.216.34", "subnetMask": 24, "gateway": "93.184.216.1" }],
    "origins": ["https://www.example.com:443", "http://www.example.com:80"]
  },
  "https://cdn.example.net:443": {
    "cmd": "./har-server.js page.har https://cdn.example.net:443 10.0.0.2,10.0.1.2",
    "ips": [
      { "ip": "10.0.0.2", "subnetMask": 24, "gateway": "10.0.0.1" },
      { "ip": "10.0.1.2", "subnetMask": 24, "gateway": "10.0.1.1" }
    ]
  },
  "http://static.example.org:8080": {
    "cmd": "./har-server.js page.har http://static.example.org:8080 10.0.0.3",
    "ips": [{ "ip": "10.0.0.3", "subnetMask": 24, "gateway": "10.0.0.1" }]
  }
}"#;

    fn plan_from(json: &str) -> TopologyPlan {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", json).unwrap();
        let config = load_config(file.path()).unwrap();

        let options = PlanOptions {
            uplink: LinkImpairment::new(1.6, 300, 10, 0).unwrap(),
            log_dir: PathBuf::from("/var/log/har"),
        };
        plan_topology(&config, &options).unwrap()
    }

    /// One host per origin, in file order
    #[test]
    fn test_hosts_follow_file_order() {
        let plan = plan_from(CONFIG);
        let hosts: Vec<&str> = plan.origin_hosts().map(|node| node.name.as_str()).collect();
        assert_eq!(
            hosts,
            vec![
                "https_www_example_com_443",
                "https_cdn_example_net_443",
                "http_static_example_org_8080"
            ]
        );
    }

    /// Exactly one switch per distinct gateway, plus the core switch
    #[test]
    fn test_one_switch_per_gateway() {
        let plan = plan_from(CONFIG);

        let gateways: HashSet<_> = plan.switches.iter().map(|switch| switch.gateway).collect();
        assert_eq!(gateways.len(), plan.switches.len());
        assert_eq!(plan.switches.len(), 4);

        let names: Vec<&str> = plan.switches.iter().map(|switch| switch.name.as_str()).collect();
        assert_eq!(names, vec!["s0", "s2", "s3", "s4"]);
    }

    #[test]
    fn test_every_assignment_is_wired() {
        let plan = plan_from(CONFIG);
        let cdn: Vec<String> = plan
            .links_of("https_cdn_example_net_443")
            .map(|link| format!("{} {} {}", link.interface, link.address.unwrap(), link.switch))
            .collect();
        assert_eq!(cdn, vec!["eth0 10.0.0.2/24 s3", "eth1 10.0.1.2/24 s4"]);

        let static_host = plan.links_of("http_static_example_org_8080").next().unwrap();
        assert_eq!(static_host.switch, "s3");
    }

    #[test]
    fn test_only_uplink_is_impaired() {
        let plan = plan_from(CONFIG);
        let impaired: Vec<&str> = plan
            .links
            .iter()
            .filter(|link| link.impairment.is_some())
            .map(|link| link.interface.as_str())
            .collect();
        assert_eq!(impaired, vec!["root-eth0"]);
    }

    /// Full build and teardown against the recording runner
    #[test]
    fn test_build_and_teardown_commands() {
        let plan = plan_from(CONFIG);
        let mut network = Network::new(plan, RecordingRunner::new());
        network.build().unwrap();
        network.stop();

        let commands = network.runner().rendered();
        let created: Vec<&String> = commands
            .iter()
            .filter(|command| command.starts_with("ip netns add "))
            .collect();
        let deleted: Vec<String> = commands
            .iter()
            .rev()
            .filter(|command| command.starts_with("ip netns del "))
            .take(created.len())
            .map(|command| command.replace("del", "add"))
            .collect();
        assert_eq!(created.len(), 5);
        assert_eq!(created, deleted.iter().collect::<Vec<_>>());

        assert!(commands.contains(
            &"tc qdisc add dev s0-eth3 parent 5:1 handle 10: netem delay 150ms 10ms".to_string()
        ));
        assert!(commands.contains(&"ip link del s4".to_string()));
    }
}
