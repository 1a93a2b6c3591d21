//! End-to-end host/script interop scenarios

use std::collections::BTreeMap;
use std::thread;

use hostbridge_core::{
    from_host, to_host, Context, Described, Error, HostFunction, HostValue, RecordDescriptor,
    TypeDescriptor, Value,
};
use maplit::btreemap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Person {
    name: String,
    age: i64,
}

impl Described for Person {
    fn descriptor() -> TypeDescriptor {
        RecordDescriptor::new("Person")
            .field::<String>("Name")
            .field::<i64>("Age")
            .into()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Address {
    desc: String,
}

impl Described for Address {
    fn descriptor() -> TypeDescriptor {
        RecordDescriptor::new("Address").field::<String>("Desc").into()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Recipient {
    person: Option<Person>,
    address: Option<Address>,
}

impl Described for Recipient {
    fn descriptor() -> TypeDescriptor {
        RecordDescriptor::new("Recipient")
            .field::<Option<Person>>("Person")
            .field::<Option<Address>>("Address")
            .into()
    }
}

fn gods() -> Vec<Person> {
    vec![
        Person {
            name: "Lemmy".into(),
            age: 70,
        },
        Person {
            name: "Ozzy".into(),
            age: 73,
        },
    ]
}

const GODS_FN: &str = r#"
    function gods() {
        return [
            {
                Name: "Lemmy",
                Age: 70,
            },
            {
                Name: "Ozzy",
                Age: 73,
            },
        ]
    }
"#;

/* ===================== Basics ===================== */

#[test]
fn test_hello() {
    let ctx = Context::new().unwrap();
    let value = ctx.execute("'hello '+'world'").unwrap();
    let s: String = ctx.export_as(&value).unwrap();
    assert_eq!(s, "hello world");
}

#[test]
fn test_fabricate_struct_in_script() {
    let ctx = Context::new().unwrap();
    let value = ctx
        .execute(
            r#"
            person = {}
            person.Name = "Lemmy"
            person.Age = 70
            person
        "#,
        )
        .unwrap();

    let mut person = Person::default();
    ctx.export_into(&value, &mut person).unwrap();
    assert_eq!(person.name, "Lemmy");
    assert_eq!(person.age, 70);
}

#[test]
fn test_fabricate_compound_struct_in_script() {
    let ctx = Context::new().unwrap();
    let value = ctx
        .execute(
            r#"
            person = {}
            person.Name = "Lemmy"
            person.Age = 70
            addr = {
                Desc: "The Rainbow"
            }
            // person
            recip = {
                Address: addr,
                Person: person,
            }
        "#,
        )
        .unwrap();

    let recip: Recipient = ctx.export_as(&value).unwrap();
    assert_eq!(recip.address.as_ref().map(|a| a.desc.as_str()), Some("The Rainbow"));
    let person = recip.person.expect("person should be present");
    assert_eq!(person.name, "Lemmy");
    assert_eq!(person.age, 70);
}

#[test]
fn test_optional_nested_record_may_be_absent() {
    let ctx = Context::new().unwrap();
    let value = ctx.execute("({ Person: { Name: 'Dio' }, Address: null })").unwrap();
    let recip: Recipient = ctx.export_as(&value).unwrap();
    assert_eq!(recip.address, None);
    assert_eq!(
        recip.person,
        Some(Person {
            name: "Dio".into(),
            age: 0
        })
    );
}

#[test]
fn test_return_object_structure() {
    let ctx = Context::new().unwrap();
    let value = ctx
        .execute(
            r#"
            const obj = {
                number: 42,
                animals: [
                    "zerba",
                    "lion",
                ],
                meta: {
                    thinger: "hullo"
                }
            };
            obj
        "#,
        )
        .unwrap();

    let obj = value.as_object().expect("object");
    assert_eq!(obj.keys(), vec!["number", "animals", "meta"]);
    let meta = obj.get("meta").unwrap();
    assert_eq!(
        meta.as_object().and_then(|m| m.get("thinger")).unwrap().as_str(),
        Some("hullo")
    );
    let animals = obj.get("animals").unwrap();
    assert_eq!(animals.as_array().map(|a| a.len()), Some(2));

    let host = ctx.export_dynamic(&value).unwrap();
    assert_eq!(host.field("number"), Some(&HostValue::Int(42)));
}

#[test]
fn test_return_array_of_structs() {
    let ctx = Context::new().unwrap();
    let value = ctx
        .execute(
            r#"
            x = [
                {
                    Name: "Lemmy",
                    Age: 70,
                },
                {
                    Name: "Ozzy",
                    Age: 73,
                },
            ]
            x
        "#,
        )
        .unwrap();

    let exported: Vec<Person> = ctx.export_as(&value).unwrap();
    assert_eq!(exported, gods());
}

#[test]
fn test_consecutive_executions_share_globals() {
    let ctx = Context::new().unwrap();
    let first = ctx.execute(&format!("{}\nnull", GODS_FN)).unwrap();
    assert!(first.is_null());

    let value = ctx.execute("gods()").unwrap();
    let exported: Vec<Person> = ctx.export_as(&value).unwrap();
    assert_eq!(exported[0].name, "Lemmy");
    assert_eq!(exported[1].name, "Ozzy");
}

/* ===================== Host functions and in-out parameters ===================== */

#[test]
fn test_script_function_fills_host_struct() {
    let ctx = Context::new().unwrap();
    ctx.execute(
        r#"
        function fillIn(person) {
            person.Name = "Dave";
            person.Age = 44;
        }
    "#,
    )
    .unwrap();

    let fill_in = ctx.bridge(&ctx.get("fillIn").unwrap()).unwrap();
    let mut person = Person::default();
    fill_in.call_in_out(&mut person).unwrap();

    assert_eq!(person.name, "Dave");
    assert_eq!(person.age, 44);
}

#[test]
fn test_host_functions_and_structs_in_context() {
    let ctx = Context::new().unwrap();
    ctx.bind_serialized("person", &Person::default()).unwrap();
    ctx.bind_fn(
        "StartName",
        HostFunction::from_fn0("StartName", || "Methusel".to_string()),
    )
    .unwrap();
    ctx.bind_fn(
        "tweaker",
        HostFunction::from_mut_fn("tweaker", |p: &mut Person| {
            p.name.push('a');
            p.age += 1;
        }),
    )
    .unwrap();

    ctx.execute(
        r#"
        person.Name = StartName()
        person.Age = 968
        tweaker(person)
    "#,
    )
    .unwrap();

    let person: Person = ctx.get_as("person").unwrap();
    assert_eq!(person.name, "Methusela");
    assert_eq!(person.age, 969);
}

#[test]
fn test_in_out_write_back_keeps_script_identity() {
    let ctx = Context::new().unwrap();
    ctx.bind_fn(
        "birthday",
        HostFunction::from_mut_fn("birthday", |p: &mut Person| p.age += 1),
    )
    .unwrap();

    let same = ctx
        .execute(
            r#"
            const p = { Name: "Lemmy", Age: 70, Band: "Motorhead" }
            const alias = p
            birthday(p)
            alias === p && alias.Age === 71 && p.Band === "Motorhead"
        "#,
        )
        .unwrap();
    assert_eq!(same.as_bool(), Some(true));
}

#[test]
fn test_bound_values_are_snapshots() {
    let ctx = Context::new().unwrap();
    let mut person = Person {
        name: "Lemmy".into(),
        age: 70,
    };
    ctx.bind_serialized("person", &person).unwrap();
    ctx.execute("person.Age = 71").unwrap();
    assert_eq!(person.age, 70);

    // explicit re-export is the copy-back point
    person = ctx.get_as("person").unwrap();
    assert_eq!(person.age, 71);
}

#[test]
fn test_function_defines_function() {
    let ctx = Context::new().unwrap();
    let weak = ctx.downgrade();
    ctx.bind_fn(
        "loadCode",
        HostFunction::dynamic("loadCode", move |_| {
            if let Some(ctx) = weak.upgrade() {
                ctx.execute(
                    r#"
                    function getAnswer() {
                        return 42;
                    }
                "#,
                )?;
            }
            Ok(HostValue::Null)
        }),
    )
    .unwrap();

    let value = ctx
        .execute(
            r#"
            loadCode()
            getAnswer()
        "#,
        )
        .unwrap();
    assert_eq!(value.to_display_string(), "42");
}

/* ===================== Bridging ===================== */

#[test]
fn test_bridged_increment() {
    let ctx = Context::new().unwrap();
    let value = ctx.execute("(function (x) { return x + 1 })").unwrap();
    let inc = ctx.bridge(&value).unwrap();
    let answer: i64 = inc.call1(&41).unwrap();
    assert_eq!(answer, 42);
}

#[test]
fn test_share_function_across_contexts() {
    let js1 = Context::new().unwrap();
    let gods_fn = js1.execute(&format!("{}\ngods", GODS_FN)).unwrap();
    let gods_callable = js1.bridge(&gods_fn).unwrap();

    let js2 = Context::new().unwrap();
    js2.bind("gods", gods_callable.clone()).unwrap();
    let value = js2.execute("gods()").unwrap();
    assert!(!value.is_null());

    let via_js2: Vec<Person> = js2.export_as(&value).unwrap();
    let direct: Vec<Person> = gods_callable.call_as(&[]).unwrap();
    assert_eq!(via_js2, direct);
    assert_eq!(direct, gods());

    // the copy in js2 is independent of js1's array
    js2.execute("const mine = gods(); mine[0].Name = 'Changed'").unwrap();
    let again: Vec<Person> = gods_callable.call_as(&[]).unwrap();
    assert_eq!(again[0].name, "Lemmy");
}

#[test]
fn test_dangling_bridge() {
    let host = Context::new().unwrap();
    let callable = {
        let doomed = Context::new().unwrap();
        let f = doomed.execute("(x) => x").unwrap();
        doomed.bridge(&f).unwrap()
    };
    assert!(!callable.is_alive());
    assert!(matches!(
        callable.call(&[HostValue::Int(1)]),
        Err(Error::DanglingContext { .. })
    ));

    // bound into another context the failure surfaces unchanged
    host.bind("gone", callable).unwrap();
    let err = host.execute("gone(1)").unwrap_err();
    assert!(matches!(err, Error::DanglingContext { .. }));
    assert_eq!(
        host.execute("try { gone(1) } catch (e) { e.name }")
            .unwrap()
            .as_str(),
        Some("DanglingContextError")
    );
}

#[test]
fn test_bridged_calls_from_many_threads() {
    let ctx = Context::new().unwrap();
    ctx.execute("var calls = 0").unwrap();
    let value = ctx
        .execute("(who) => { calls += 1; return 'hi ' + who.Name }")
        .unwrap();
    let greet = ctx.bridge(&value).unwrap();

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let greet = greet.clone();
            thread::spawn(move || {
                let person = Person {
                    name: format!("t{}", i),
                    age: i,
                };
                let reply: String = greet.call1(&person).unwrap();
                assert_eq!(reply, format!("hi t{}", i));
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(ctx.get_as::<i64>("calls").unwrap(), 6);
}

/* ===================== Interchange ===================== */

#[test]
fn test_json_interchange() {
    let ctx = Context::new().unwrap();
    let json_text = serde_json::to_string(&gods()).unwrap();
    ctx.bind("jsonText", json_text).unwrap();

    let value = ctx
        .execute(
            r#"
            const gods = JSON.parse(jsonText);
            gods[1].Name
        "#,
        )
        .unwrap();
    assert_eq!(value.to_display_string(), "Ozzy");
}

#[test]
fn test_json_equals_direct_conversion() {
    let ctx = Context::new().unwrap();
    ctx.bind("jsonText", serde_json::to_string(&gods()).unwrap())
        .unwrap();
    ctx.bind_serialized("direct", &gods()).unwrap();

    let parsed = ctx.execute("JSON.parse(jsonText)").unwrap();
    let via_json: Vec<Person> = ctx.export_as(&parsed).unwrap();
    let via_bind: Vec<Person> = ctx.get_as("direct").unwrap();
    assert_eq!(via_json, via_bind);
    assert_eq!(via_json, gods());
}

#[test]
fn test_round_trip_through_script() {
    let ctx = Context::new().unwrap();
    let recip = Recipient {
        person: Some(Person {
            name: "Ronnie".into(),
            age: 67,
        }),
        address: Some(Address {
            desc: "Holy Diver".into(),
        }),
    };

    let value = ctx.to_value(&to_host(&recip).unwrap()).unwrap();
    let back = ctx.export(&value, &Recipient::descriptor()).unwrap();
    assert_eq!(from_host::<Recipient>(back).unwrap(), recip);
}

#[test]
fn test_maps_and_sequences_keep_shape() {
    let ctx = Context::new().unwrap();
    let scores: BTreeMap<String, Vec<i64>> = btreemap! {
        "lemmy".to_string() => vec![3, 1, 2],
        "ozzy".to_string() => vec![],
    };
    ctx.bind_serialized("scores", &scores).unwrap();
    ctx.execute("scores.lemmy.push(4)").unwrap();

    let back: BTreeMap<String, Vec<i64>> = ctx.get_as("scores").unwrap();
    assert_eq!(back["lemmy"], vec![3, 1, 2, 4]);
    assert!(back["ozzy"].is_empty());
}

#[test]
fn test_type_mismatch_path() {
    let ctx = Context::new().unwrap();
    let value = ctx
        .execute("[{ Name: 'Lemmy', Age: 70 }, { Name: 'Ozzy', Age: 'old' }]")
        .unwrap();
    match ctx.export_as::<Vec<Person>>(&value) {
        Err(Error::TypeMismatch { path, .. }) => assert_eq!(path, "$[1].Age"),
        other => panic!("expected type mismatch, got {:?}", other),
    }
}

#[test]
fn test_execute_values_are_plain_data() {
    let ctx = Context::new().unwrap();
    let value = ctx.execute("[1, 'two', null, true]").unwrap();
    match value {
        Value::Array(arr) => {
            let items = arr.to_vec();
            assert_eq!(items[0].as_number(), Some(1.0));
            assert_eq!(items[1].as_str(), Some("two"));
            assert!(items[2].is_null());
            assert_eq!(items[3].as_bool(), Some(true));
        }
        other => panic!("expected array, got {:?}", other),
    }
}
