//! Client and service talking through the in-process transport.

use std::sync::Arc;

use tagpack::Class;
use tagpack::ClassRegistry;
use tagpack::Object;
use tagpack::Value;
use tagrpc::CallContext;
use tagrpc::Client;
use tagrpc::Error;
use tagrpc::Filter;
use tagrpc::InvokeSettings;
use tagrpc::MethodOptions;
use tagrpc::ResultMode;
use tagrpc::Service;
use tagrpc::ServiceTransport;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, PartialEq)]
struct Point {
    x: i64,
    y: i64,
}

impl Class for Point {
    fn to_fields(&self) -> Vec<(String, Value)> {
        vec![("x".into(), self.x.into()), ("y".into(), self.y.into())]
    }

    fn from_object(object: &Object) -> tagpack::Result<Self> {
        let field = |name: &str| object.get(name).unwrap_or(Value::Null).as_i64();
        Ok(Point { x: field("x")?, y: field("y")? })
    }
}

/// XORs every byte; its own inverse.
struct Scramble(u8);

impl<C> Filter<C> for Scramble {
    fn input(&self, data: Vec<u8>, _: &C) -> Vec<u8> {
        data.into_iter().map(|b| b ^ self.0).collect()
    }

    fn output(&self, data: Vec<u8>, _: &C) -> Vec<u8> {
        data.into_iter().map(|b| b ^ self.0).collect()
    }
}

fn service(registry: Arc<ClassRegistry>) -> Service {
    let mut service = Service::new().with_registry(registry.clone());

    service.add_function("sum", |args: &mut Vec<Value>, _: &()| {
        let mut total = 0;
        for arg in args.iter() {
            total += arg.as_i64()?;
        }
        Ok(Value::Int(total))
    });
    service.add_function("hello", |args: &mut Vec<Value>, _: &()| {
        let name = args.first().cloned().unwrap_or(Value::Null).as_string()?;
        Ok(Value::from(format!("Hello {}!", name)))
    });
    service.add_function("double_all", |args: &mut Vec<Value>, _: &()| {
        for arg in args.iter_mut() {
            *arg = Value::Int(arg.as_i64()? * 2);
        }
        Ok(Value::from(args.len() as i64))
    });
    service.add_function("fail", |_: &mut Vec<Value>, _: &()| -> anyhow::Result<Value> {
        anyhow::bail!("nothing works")
    });
    service.add_function("move", move |args: &mut Vec<Value>, _: &()| {
        let object = args.first().cloned().unwrap_or(Value::Null);
        let point: Point = registry.from_object(object.as_object()?)?;
        let moved = Point { x: point.x + 1, y: point.y + 1 };
        Ok(Value::Object(registry.to_object(&moved)))
    });
    service.add_function_with(
        "encoded",
        |_: &mut Vec<Value>, _: &()| Ok(Value::bytes(tagpack::serialize(&Value::from("pre-encoded"), true)?)),
        MethodOptions::new().mode(ResultMode::Serialized),
    );
    service.add_missing_function(
        |name: &str, _: &mut Vec<Value>, _: &()| Ok(Value::from(format!("missing {}", name))),
        MethodOptions::default(),
    );
    service
}

fn connect() -> Client {
    init_tracing();
    let registry = Arc::new(ClassRegistry::new());
    registry.register::<Point>("Point");
    let service = Arc::new(service(registry.clone()));
    Client::new(Arc::new(ServiceTransport::new(service))).with_registry(registry)
}

#[tokio::test]
async fn lists_functions() -> tagrpc::Result<()> {
    let client = connect();
    let names = client.functions().await?;
    assert_eq!(names, vec!["sum", "hello", "double_all", "fail", "move", "encoded", "*"]);
    Ok(())
}

#[tokio::test]
async fn calls_and_results() -> tagrpc::Result<()> {
    let client = connect();

    let mut args = vec![Value::Int(40), Value::Int(2)];
    assert_eq!(client.invoke("sum", &mut args, InvokeSettings::new()).await?, Value::Int(42));

    let mut args = vec!["world".into()];
    let greeting = client.invoke("Hello", &mut args, InvokeSettings::new()).await?;
    assert_eq!(greeting.as_string()?, "Hello world!");

    let missing = client.invoke("Whatever", &mut Vec::new(), InvokeSettings::new()).await?;
    assert_eq!(missing.as_string()?, "missing Whatever");
    Ok(())
}

#[tokio::test]
async fn remote_errors_surface() {
    let client = connect();
    let err = client.invoke("fail", &mut Vec::new(), InvokeSettings::new()).await.unwrap_err();
    assert!(matches!(err, Error::Remote(ref msg) if msg == "nothing works"));

    let mut args = vec!["not a number".into()];
    let err = client.invoke("sum", &mut args, InvokeSettings::new()).await.unwrap_err();
    assert!(matches!(err, Error::Remote(ref msg) if msg.contains("type mismatch")));
}

#[tokio::test]
async fn arguments_by_reference() -> tagrpc::Result<()> {
    let client = connect();
    let mut args = vec![Value::Int(1), Value::Int(5)];

    let count = client.invoke("double_all", &mut args, InvokeSettings::new()).await?;
    assert_eq!(count, Value::Int(2));
    assert_eq!(args, vec![Value::Int(1), Value::Int(5)]);

    client.invoke("double_all", &mut args, InvokeSettings::new().by_ref(true)).await?;
    assert_eq!(args, vec![Value::Int(2), Value::Int(10)]);
    Ok(())
}

#[tokio::test]
async fn objects_travel_by_class() -> tagrpc::Result<()> {
    let client = connect();
    let registry = client.registry().clone();

    let mut args = vec![Value::Object(registry.to_object(&Point { x: 1, y: 2 }))];
    let moved = client.invoke("move", &mut args, InvokeSettings::new()).await?;
    let moved: Point = registry.from_object(moved.as_object()?)?;
    assert_eq!(moved, Point { x: 2, y: 3 });
    Ok(())
}

#[tokio::test]
async fn serialized_results() -> tagrpc::Result<()> {
    let client = connect();
    let settings = InvokeSettings::new().mode(ResultMode::Serialized);
    let encoded = client.invoke("encoded", &mut Vec::new(), settings).await?;
    assert_eq!(encoded, Value::bytes(&b"s11\"pre-encoded\""[..]));

    let decoded = client.invoke("encoded", &mut Vec::new(), InvokeSettings::new()).await?;
    assert_eq!(decoded, Value::from("pre-encoded"));
    Ok(())
}

#[tokio::test]
async fn asynchronous_callbacks() {
    let client = connect();

    let (tx, rx) = oneshot::channel();
    let handle = client.invoke_with(
        "double_all",
        vec![Value::Int(21)],
        InvokeSettings::new().by_ref(true),
        move |result, args| {
            let _ = tx.send((result, args));
        },
        None,
    );
    handle.await.unwrap();
    let (result, args) = rx.await.unwrap();
    assert_eq!(result, Value::Int(1));
    assert_eq!(args, vec![Value::Int(42)]);
}

#[tokio::test]
async fn asynchronous_errors_reach_hooks() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = connect().with_error_hook(move |name, error| {
        let _ = tx.send(format!("{}: {}", name, error));
    });

    client
        .invoke_with("fail", Vec::new(), InvokeSettings::new(), |_, _| panic!("must fail"), None)
        .await
        .unwrap();
    assert_eq!(rx.recv().await.unwrap(), "fail: nothing works");

    // a per-call hook takes precedence
    let (own_tx, mut own_rx) = mpsc::unbounded_channel();
    let hook: tagrpc::ErrorHook = Arc::new(move |name: &str, _: Error| {
        let _ = own_tx.send(name.to_string());
    });
    client
        .invoke_with("fail", Vec::new(), InvokeSettings::new(), |_, _| panic!("must fail"), Some(hook))
        .await
        .unwrap();
    assert_eq!(own_rx.recv().await.unwrap(), "fail");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn filters_on_both_sides() -> tagrpc::Result<()> {
    init_tracing();
    let registry = Arc::new(ClassRegistry::new());
    let mut service = service(registry);
    service.add_filter(Arc::new(Scramble(0x5a)));
    let client = Client::new(Arc::new(ServiceTransport::new(Arc::new(service))));

    // without the matching filter the scrambled response has no end marker
    let err = client.invoke("sum", &mut vec![Value::Int(1)], InvokeSettings::new()).await.unwrap_err();
    assert!(matches!(err, Error::MalformedResponse(_)));

    let filter: Arc<dyn Filter<CallContext>> = Arc::new(Scramble(0x5a));
    client.add_filter(filter);
    let mut args = vec![Value::Int(3), Value::Int(4)];
    assert_eq!(client.invoke("sum", &mut args, InvokeSettings::new()).await?, Value::Int(7));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_calls() -> tagrpc::Result<()> {
    let client = connect();
    let mut handles = Vec::new();
    for i in 0..32i64 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let mut args = vec![Value::Int(i), Value::Int(i)];
            client.invoke("sum", &mut args, InvokeSettings::new()).await
        }));
    }
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await.unwrap()?, Value::Int(2 * i as i64));
    }
    Ok(())
}
