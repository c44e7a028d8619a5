// tests/rollcall.rs
use serde_json::{json, Map, Value};
use site_trawler::rollcall::RollCallConfig;
use site_trawler::{roll_call, Record};

fn names(ns: &[&str]) -> Vec<String> {
    ns.iter().map(|s| s.to_string()).collect()
}

fn null_v() -> Map<String, Value> {
    Map::from_iter([("v".to_string(), Value::Null)])
}

#[test]
fn absentees_get_defaults_in_expected_order() {
    let attendees = vec![Record::new("b").with("name", "B").with("v", 5)];
    let out = roll_call(&names(&["A", "B", "C"]), "name", &null_v(), &attendees);

    let values: Vec<Value> = out.iter().map(|e| e.to_value()).collect();
    assert_eq!(
        values,
        vec![
            json!({"name": "A", "v": null}),
            json!({"id": "b", "name": "B", "v": 5}),
            json!({"name": "C", "v": null}),
        ]
    );
}

#[test]
fn same_inputs_same_output_and_length_follows_names() {
    let attendees = vec![
        Record::new("x").with("name", "Porch"),
        Record::new("y").with("name", "Hall"),
        Record::new("z").with("name", "Attic"),
        Record::new("w").with("name", "Hall"),
    ];
    let expected = names(&["Hall", "Hall", "Hall", "Garage"]);
    let first = roll_call(&expected, "name", &null_v(), &attendees);
    let second = roll_call(&expected, "name", &null_v(), &attendees);
    assert_eq!(first, second);
    assert_eq!(first.len(), expected.len());

    // Two "Hall" records answer the first two calls; the third is absent.
    let present: Vec<bool> = first.iter().map(|e| e.is_present()).collect();
    assert_eq!(present, vec![true, true, false, false]);
}

#[test]
fn config_form_deserializes_from_toml() {
    let rc: RollCallConfig = toml::from_str(
        r#"
names = ["Hall", "Porch"]
attendee_field = "name"
value_field = "battery"
absent_defaults = { battery = "" }
"#,
    )
    .unwrap();
    let out = rc.reconcile(&[Record::new("p").with("name", "Porch").with("battery", 88)]);
    assert_eq!(out[0].get("battery"), Some(&json!("")));
    assert_eq!(out[1].get("battery"), Some(&json!(88)));
}
