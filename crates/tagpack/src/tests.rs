use chrono::NaiveDate;
use chrono::NaiveTime;
use num_bigint::BigInt;
use rand::Rng;
use uuid::Uuid;

use super::Result;
use super::Error;
use super::Value;
use super::List;
use super::Map;
use super::Object;
use super::DateTime;
use super::Time;
use super::Class;
use super::ClassRegistry;
use super::Reader;
use super::Writer;
use super::Cursor;
use super::Tag;

type R<T> = Result<T>;

fn encode(value: &Value) -> R<Vec<u8>> {
    super::serialize(value, false)
}

fn decode(bytes: &[u8]) -> R<Value> {
    super::unserialize(bytes, &ClassRegistry::new(), false)
}

fn roundtrip(value: Value) -> R<()> {
    let bytes = encode(&value)?;
    let back = decode(&bytes)?;
    assert_eq!(back, value, "wire: {}", String::from_utf8_lossy(&bytes));
    Ok(())
}

#[test]
fn test_mixed_list_layout() -> R<()> {
    let list = Value::list(vec![1.into(), "hi".into(), Value::Null, true.into()]);
    let bytes = encode(&list)?;
    assert_eq!(bytes, b"a4{1s2\"hi\"nt}");
    assert_eq!(decode(&bytes)?, list);
    Ok(())
}

// ==== SCALARS ====

#[test]
fn test_integer_boundaries() -> R<()> {
    let cases: &[(i64, &[u8])] = &[
        (0, b"0"),
        (9, b"9"),
        (10, b"i10;"),
        (-1, b"i-1;"),
        (i32::MAX as i64, b"i2147483647;"),
        (i32::MIN as i64, b"i-2147483648;"),
        (i32::MAX as i64 + 1, b"l2147483648;"),
        (i64::MIN, b"l-9223372036854775808;"),
    ];
    for (n, wire) in cases {
        let bytes = encode(&Value::Int(*n))?;
        assert_eq!(bytes, *wire);
        assert_eq!(decode(&bytes)?, Value::Int(*n));
    }
    Ok(())
}

#[test]
fn test_big_integer() -> R<()> {
    let big: BigInt = BigInt::from(1u8) << 70;
    let bytes = encode(&Value::from(big.clone()))?;
    assert_eq!(bytes, b"l1180591620717411303424;");
    assert_eq!(decode(&bytes)?, Value::BigInt(big));

    // a long literal that fits comes back as a plain integer
    assert!(matches!(decode(b"l42;")?, Value::Int(42)));
    Ok(())
}

#[test]
fn test_random_integers() -> R<()> {
    let mut rng = rand::thread_rng();
    for _ in 0..256 {
        roundtrip(Value::Int(rng.r#gen::<i64>()))?;
        roundtrip(Value::Int(rng.r#gen::<i32>() as i64))?;
    }
    Ok(())
}

#[test]
fn test_doubles() -> R<()> {
    assert_eq!(encode(&Value::Double(1.5))?, b"d1.5;");
    assert_eq!(encode(&Value::Double(f64::NAN))?, b"N");
    assert_eq!(encode(&Value::Double(f64::INFINITY))?, b"I+");
    assert_eq!(encode(&Value::Double(f64::NEG_INFINITY))?, b"I-");

    assert!(decode(b"N")?.as_f64()?.is_nan());
    assert_eq!(decode(b"I-")?, Value::Double(f64::NEG_INFINITY));
    roundtrip(Value::Double(-0.1))?;
    roundtrip(Value::Double(1e300))?;
    Ok(())
}

#[test]
fn test_empty_values_have_no_length() -> R<()> {
    assert_eq!(encode(&Value::from(""))?, b"e");
    assert_eq!(encode(&Value::String(String::new()))?, b"e");
    assert_eq!(encode(&Value::Bytes(Vec::new()))?, b"e");
    assert_eq!(decode(b"e")?, Value::Empty);
    assert_eq!(decode(b"b\"\"")?, Value::Empty);
    Ok(())
}

#[test]
fn test_strings_and_chars() -> R<()> {
    assert_eq!(encode(&Value::from("é"))?, "ué".as_bytes());
    assert_eq!(encode(&Value::from("hello"))?, b"s5\"hello\"");
    // supplementary-plane characters count as two units
    assert_eq!(encode(&Value::from("😀a"))?, "s3\"😀a\"".as_bytes());

    roundtrip(Value::from("😀a"))?;
    roundtrip(Value::from("ü"))?;
    roundtrip(Value::from("héllo wörld"))?;
    Ok(())
}

#[test]
fn test_bytes_and_guid() -> R<()> {
    let bytes = encode(&Value::from(&b"\x00z\""[..]))?;
    assert_eq!(bytes, b"b3\"\x00z\"\"");
    roundtrip(Value::from(&b"\x00z\""[..]))?;

    let guid = Uuid::parse_str("0f8fad5b-d9cb-469f-a165-70867728950e").unwrap();
    let bytes = encode(&Value::Guid(guid))?;
    assert_eq!(bytes, b"g{0f8fad5b-d9cb-469f-a165-70867728950e}");
    assert_eq!(decode(&bytes)?, Value::Guid(guid));
    Ok(())
}

// ==== DATES ====

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn test_date_forms() -> R<()> {
    let day = date(2024, 3, 5);

    let plain = Value::Date(DateTime::new(day, None, false));
    assert_eq!(encode(&plain)?, b"D20240305;");

    let midnight = Value::Date(DateTime::new(day, Some(NaiveTime::MIN), true));
    assert_eq!(encode(&midnight)?, b"D20240305Z");

    let utc = Value::Date(DateTime::new(day, NaiveTime::from_hms_opt(13, 4, 5), true));
    assert_eq!(encode(&utc)?, b"D20240305T130405Z");

    let millis = Value::Date(DateTime::new(day, NaiveTime::from_hms_milli_opt(13, 4, 5, 120), false));
    assert_eq!(encode(&millis)?, b"D20240305T130405.120;");

    let micros = Value::Date(DateTime::new(day, NaiveTime::from_hms_micro_opt(13, 4, 5, 123456), false));
    assert_eq!(encode(&micros)?, b"D20240305T130405.123456;");

    for value in [plain, midnight, utc, millis, micros] {
        roundtrip(value)?;
    }
    Ok(())
}

#[test]
fn test_time_forms() -> R<()> {
    let time = Value::Time(Time::new(NaiveTime::from_hms_opt(1, 2, 3).unwrap(), false));
    assert_eq!(encode(&time)?, b"T010203;");
    roundtrip(time)?;

    // a time on the epoch date travels in time-only form
    let anchored = Value::Date(DateTime::new(NaiveDate::default(), NaiveTime::from_hms_opt(1, 0, 0), true));
    let bytes = encode(&anchored)?;
    assert_eq!(bytes, b"T010000Z");
    assert!(matches!(decode(&bytes)?, Value::Time(_)));
    assert_eq!(decode(&bytes)?, anchored);
    Ok(())
}

#[test]
fn test_fraction_truncated_to_micros() -> R<()> {
    let value = decode(b"T010203.123456789;")?;
    let expected = Time::new(NaiveTime::from_hms_micro_opt(1, 2, 3, 123456).unwrap(), false);
    assert_eq!(value, Value::Time(expected));

    let nanos = Value::Time(Time::new(NaiveTime::from_hms_nano_opt(1, 2, 3, 123456789).unwrap(), true));
    assert_eq!(encode(&nanos)?, b"T010203.123456789Z");
    Ok(())
}

#[test]
fn test_date_out_of_range() {
    let far = Value::Date(DateTime::new(date(10000, 1, 1), None, false));
    assert!(matches!(encode(&far), Err(Error::UnsupportedType(_))));
    assert!(matches!(decode(b"D20241305;"), Err(Error::InvalidDate(_))));
}

// ==== CONTAINERS AND REFERENCES ====

#[test]
fn test_empty_containers() -> R<()> {
    assert_eq!(encode(&Value::list(Vec::new()))?, b"a{}");
    assert_eq!(encode(&Value::Map(Map::new()))?, b"m{}");
    roundtrip(Value::list(Vec::new()))?;
    Ok(())
}

#[test]
fn test_map_keeps_order() -> R<()> {
    let map = Map::from_entries(vec![("key".into(), 1.into()), (2.into(), "two".into())]);
    let bytes = encode(&Value::Map(map.clone()))?;
    assert_eq!(bytes, b"m2{s3\"key\"12s3\"two\"}");

    let back = decode(&bytes)?;
    let back = back.as_map()?;
    assert_eq!(back.entries()[0].0, Value::from("key"));
    assert_eq!(back.get(&Value::Int(2)), Some(Value::from("two")));
    Ok(())
}

#[test]
fn test_repeated_string_is_referenced() -> R<()> {
    let list = Value::list(vec!["hello".into(), "hello".into()]);
    assert_eq!(encode(&list)?, b"a2{s5\"hello\"r1;}");
    assert_eq!(super::serialize(&list, true)?, b"a2{s5\"hello\"s5\"hello\"}");
    roundtrip(list)?;
    Ok(())
}

#[test]
fn test_shared_list_keeps_identity() -> R<()> {
    let inner = List::from_vec(vec![1.into()]);
    let outer = Value::list(vec![Value::List(inner.clone()), Value::List(inner)]);
    let bytes = encode(&outer)?;
    assert_eq!(bytes, b"a2{a1{1}r1;}");

    let back = decode(&bytes)?;
    let items = back.as_list()?.to_vec();
    assert!(items[0].as_list()?.ptr_eq(items[1].as_list()?));
    Ok(())
}

#[test]
fn test_cyclic_list() -> R<()> {
    let list = List::new();
    list.push(Value::List(list.clone()));
    let bytes = encode(&Value::List(list))?;
    assert_eq!(bytes, b"a1{r0;}");

    let back = decode(&bytes)?;
    let back = back.as_list()?;
    assert!(back.get(0).unwrap().as_list()?.ptr_eq(back));
    Ok(())
}

#[test]
fn test_simple_reader_rejects_refs() {
    let registry = ClassRegistry::new();
    let err = super::unserialize(b"a2{s5\"hello\"r1;}", &registry, true).unwrap_err();
    assert_eq!(err, Error::UnexpectedTag { actual: b'r', expected: None });
}

// ==== OBJECTS ====

#[derive(Debug, PartialEq)]
struct Point {
    x: i64,
    y: i64,
}

impl Class for Point {
    fn to_fields(&self) -> Vec<(String, Value)> {
        vec![("x".into(), self.x.into()), ("y".into(), self.y.into())]
    }

    fn from_object(object: &Object) -> Result<Self> {
        let field = |name: &str| object.get(name).unwrap_or(Value::Null).as_i64();
        Ok(Point { x: field("x")?, y: field("y")? })
    }
}

#[test]
fn test_class_block_written_once() -> R<()> {
    let registry = ClassRegistry::new();
    registry.register::<Point>("Point");

    let points = Value::list(vec![
        registry.to_object(&Point { x: 1, y: 2 }).into(),
        registry.to_object(&Point { x: 3, y: 4 }).into(),
    ]);
    let bytes = encode(&points)?;
    assert_eq!(bytes, b"a2{c5\"Point\"2{s1\"x\"s1\"y\"}o0{12}o0{34}}");

    let back = super::unserialize(&bytes, &registry, false)?;
    let items = back.as_list()?.to_vec();
    let second: Point = registry.from_object(items[1].as_object()?)?;
    assert_eq!(second, Point { x: 3, y: 4 });
    Ok(())
}

#[test]
fn test_unknown_class_decodes_structurally() -> R<()> {
    let registry = ClassRegistry::new();
    let value = super::unserialize(b"c4\"User\"1{s4\"name\"}o0{s3\"ann\"}", &registry, false)?;
    let object = value.as_object()?;
    assert_eq!(object.alias(), "User");
    assert!(object.class().is_placeholder());
    assert_eq!(object.get("name"), Some(Value::from("ann")));
    assert!(matches!(registry.from_object::<Point>(object), Err(Error::TypeMismatch { .. })));
    Ok(())
}

#[test]
fn test_cyclic_object() -> R<()> {
    let registry = ClassRegistry::new();
    let node = Object::with_fields(registry.class_for("Node"), vec![("name".into(), "a".into())]);
    node.set("next", Value::Object(node.clone()));

    let bytes = encode(&Value::Object(node))?;
    assert_eq!(bytes, b"c4\"Node\"2{s4\"name\"s4\"next\"}o0{uar2;}");

    let back = super::unserialize(&bytes, &registry, false)?;
    let back = back.as_object()?;
    assert!(back.get("next").unwrap().as_object()?.ptr_eq(back));
    Ok(())
}

#[test]
fn test_missing_field_written_as_null() -> R<()> {
    let registry = ClassRegistry::new();
    let class = registry.class_for("Pair");
    let full = Object::with_fields(class.clone(), vec![("a".into(), 1.into()), ("b".into(), 2.into())]);
    let partial = Object::with_fields(class, vec![("b".into(), 5.into())]);

    let bytes = encode(&Value::list(vec![full.into(), partial.into()]))?;
    assert_eq!(bytes, b"a2{c4\"Pair\"2{s1\"a\"s1\"b\"}o0{12}o0{n5}}");
    Ok(())
}

// ==== READER SURFACE ====

#[test]
fn test_typed_reads() -> R<()> {
    let registry = ClassRegistry::new();
    let mut reader = Reader::new(b"5i-7;ne s3\"abc\"r0;uxd1.25;tn".as_slice(), &registry);
    assert_eq!(reader.read_integer()?, 5);
    assert_eq!(reader.read_double()?, -7.0);
    assert_eq!(reader.read_string()?, None);
    assert_eq!(reader.read_string()?, Some(String::new()));
    assert!(matches!(reader.read_bool(), Err(Error::UnexpectedTag { actual: b' ', .. })));
    assert_eq!(reader.read_string()?.as_deref(), Some("abc"));
    assert_eq!(reader.read_string()?.as_deref(), Some("abc"));
    assert_eq!(reader.read_string()?.as_deref(), Some("x"));
    assert_eq!(reader.read_double()?, 1.25);
    assert!(reader.read_bool()?);
    assert_eq!(reader.read_list()?, None);
    Ok(())
}

#[test]
fn test_check_tags() -> R<()> {
    let registry = ClassRegistry::new();
    let mut reader = Reader::simple(b"RAz", &registry);
    reader.check_tag(Tag::Result)?;
    assert_eq!(reader.check_tags(&[Tag::Argument, Tag::End])?, Tag::Argument);

    let err = reader.check_tag(Tag::Result).unwrap_err();
    assert_eq!(err.to_string(), "tag 'R' expected, but 'z' found in stream");
    assert_eq!(reader.check_tag(Tag::End), Err(Error::StreamExhausted));
    Ok(())
}

#[test]
fn test_read_raw() -> R<()> {
    let registry = ClassRegistry::new();
    let data = b"c5\"Point\"2{s1\"x\"s1\"y\"}o0{12}a2{s2\"hi\"D20240305;}I-z";
    let mut reader = Reader::new(data, &registry);
    assert_eq!(reader.read_raw()?, b"c5\"Point\"2{s1\"x\"s1\"y\"}o0{12}");
    assert_eq!(reader.read_raw()?, b"a2{s2\"hi\"D20240305;}");
    assert_eq!(reader.read_raw()?, b"I-");
    reader.check_tag(Tag::End)?;
    Ok(())
}

#[test]
fn test_reset_clears_references() -> R<()> {
    let mut writer = Writer::new();
    writer.serialize(&"hello".into())?;
    writer.serialize(&"hello".into())?;
    writer.reset();
    writer.serialize(&"hello".into())?;
    assert_eq!(writer.as_bytes(), b"s5\"hello\"r0;s5\"hello\"");

    let registry = ClassRegistry::new();
    let mut reader = Reader::new(writer.as_bytes(), &registry);
    reader.unserialize()?;
    assert_eq!(reader.unserialize()?, Value::from("hello"));
    reader.reset();
    assert_eq!(reader.unserialize()?, Value::from("hello"));
    Ok(())
}

#[test]
fn test_malformed_input() {
    assert_eq!(decode(b""), Err(Error::StreamExhausted));
    assert_eq!(decode(b"x"), Err(Error::UnexpectedTag { actual: b'x', expected: None }));
    assert_eq!(decode(b"a2{1"), Err(Error::StreamExhausted));
    assert_eq!(decode(b"r0;"), Err(Error::BadReference(0)));
    assert_eq!(decode(b"o0{}"), Err(Error::BadReference(0)));
    assert!(matches!(decode(b"i12x"), Err(Error::StreamExhausted)));
    assert!(matches!(decode(b"i1x;"), Err(Error::InvalidNumber(_))));
    assert!(matches!(decode(b"g{zzzzzzzz-zzzz-zzzz-zzzz-zzzzzzzzzzzz}"), Err(Error::InvalidGuid(_))));
    assert_eq!(decode(b"a1{1]"), Err(Error::UnexpectedTag { actual: b']', expected: Some(b"}".to_vec()) }));
}

#[test]
fn test_oversized_prefixes() {
    let huge = usize::MAX;
    assert_eq!(decode(format!("b{}\"\"", huge).as_bytes()), Err(Error::StreamExhausted));
    assert_eq!(decode(format!("s{}\"ab\"", huge).as_bytes()), Err(Error::StreamExhausted));
    assert_eq!(decode(format!("r{};", huge).as_bytes()), Err(Error::BadReference(huge)));
    assert_eq!(decode(format!("a{}{{1}}", huge).as_bytes()), Err(Error::unexpected(b'}')));
    assert_eq!(decode(format!("c1\"P\"{}{{}}", huge).as_bytes()), Err(Error::unexpected(b'}')));
    assert!(matches!(decode(b"b99999999999999999999999\"\""), Err(Error::InvalidNumber(_))));

    let registry = ClassRegistry::new();
    let data = format!("b{}\"\"", huge);
    let mut reader = Reader::new(data.as_bytes(), &registry);
    assert_eq!(reader.read_raw(), Err(Error::StreamExhausted));
    let mut reader = Reader::new(b"b2\"abc\"", &registry);
    assert!(matches!(reader.read_raw(), Err(Error::UnexpectedTag { actual: b'c', .. })));
}

fn nested_lists(depth: usize) -> Vec<u8> {
    let mut data = b"a1{".repeat(depth);
    data.push(b'1');
    data.extend(b"}".repeat(depth));
    data
}

#[test]
fn test_nesting_limit() -> R<()> {
    let max = super::MAX_DEPTH;

    let mut value = decode(&nested_lists(max - 1))?;
    for _ in 0..max - 1 {
        let inner = value.as_list()?.get(0).unwrap();
        value = inner;
    }
    assert_eq!(value, Value::Int(1));

    assert_eq!(decode(&nested_lists(max)), Err(Error::TooDeep(max)));
    assert_eq!(decode(&nested_lists(200_000)), Err(Error::TooDeep(max)));

    let registry = ClassRegistry::new();
    let data = nested_lists(200_000);
    let mut reader = Reader::new(&data, &registry);
    assert_eq!(reader.read_raw(), Err(Error::TooDeep(max)));
    let data = nested_lists(max - 1);
    let mut reader = Reader::new(&data, &registry);
    assert_eq!(reader.read_raw()?, &data[..]);

    // the reader stays usable after hitting the limit
    let data = nested_lists(max);
    let mut reader = Reader::new(&data, &registry);
    assert_eq!(reader.unserialize(), Err(Error::TooDeep(max)));
    *reader.cursor_mut() = Cursor::new(b"a1{a1{1}}");
    assert_eq!(reader.unserialize()?, Value::list(vec![Value::list(vec![1.into()])]));
    Ok(())
}

#[test]
fn test_writer_nesting_limit() -> R<()> {
    let max = super::MAX_DEPTH;
    let mut value = Value::Int(1);
    for _ in 0..max - 1 {
        value = Value::list(vec![value]);
    }
    assert_eq!(encode(&value)?, nested_lists(max - 1));
    assert_eq!(encode(&Value::list(vec![value])), Err(Error::TooDeep(max)));

    // without references a cycle never bottoms out
    let list = List::new();
    list.push(Value::List(list.clone()));
    let err = super::serialize(&Value::List(list.clone()), true).unwrap_err();
    assert_eq!(err, Error::TooDeep(max));
    assert_eq!(encode(&Value::List(list))?, b"a1{r0;}");
    Ok(())
}
