//! Tests for the container payloads: dicts, sets, user objects, and
//! value rendering.

use pretty_assertions::assert_eq;
use sable::{BuiltinExc, Dict, Heap, HeapData, Instance, List, Set, Value, VmState};

fn alloc_str(heap: &mut Heap, vm: &mut VmState, text: &str) -> Value {
    let id = heap.allocate(HeapData::Str(text.into()), vm.gc_roots()).unwrap();
    vm.stack.push(Value::Ref(id));
    Value::Ref(id)
}

#[test]
fn dict_keys_compare_strings_by_content() {
    let mut heap = Heap::new();
    let mut vm = VmState::new(0);

    let dict = heap.allocate(HeapData::Dict(Dict::new()), vm.gc_roots()).unwrap();
    vm.stack.push(Value::Ref(dict));

    let key_a = alloc_str(&mut heap, &mut vm, "name");
    let key_b = alloc_str(&mut heap, &mut vm, "name");
    assert_ne!(key_a, key_b);

    heap.dict_insert(dict, key_a, Value::Num(1.0)).unwrap();
    let previous = heap.dict_insert(dict, key_b, Value::Num(2.0)).unwrap();
    assert_eq!(previous, Some(Value::Num(1.0)));
    assert_eq!(heap.dict_get(dict, &key_a).unwrap(), Some(Value::Num(2.0)));
}

#[test]
fn dict_rejects_unhashable_keys() {
    let mut heap = Heap::new();
    let mut vm = VmState::new(0);

    let dict = heap.allocate(HeapData::Dict(Dict::new()), vm.gc_roots()).unwrap();
    let list = heap.allocate(HeapData::List(List::new()), vm.gc_roots()).unwrap();
    vm.stack.push(Value::Ref(dict));
    vm.stack.push(Value::Ref(list));

    let error = heap.dict_insert(dict, Value::Ref(list), Value::None).unwrap_err();
    assert_eq!(error.kind(), BuiltinExc::TypeError);
    assert_eq!(error.message(), "Unhashable type 'list'");
}

#[test]
fn dict_distinguishes_primitive_keys() {
    let mut heap = Heap::new();
    let mut vm = VmState::new(0);

    let dict = heap.allocate(HeapData::Dict(Dict::new()), vm.gc_roots()).unwrap();
    vm.stack.push(Value::Ref(dict));

    heap.dict_insert(dict, Value::Num(1.0), Value::Num(10.0)).unwrap();
    heap.dict_insert(dict, Value::Bool(true), Value::Num(20.0)).unwrap();
    heap.dict_insert(dict, Value::None, Value::Num(30.0)).unwrap();

    assert_eq!(heap.dict_get(dict, &Value::Num(1.0)).unwrap(), Some(Value::Num(10.0)));
    assert_eq!(heap.dict_get(dict, &Value::Bool(true)).unwrap(), Some(Value::Num(20.0)));
    assert_eq!(heap.dict_get(dict, &Value::None).unwrap(), Some(Value::Num(30.0)));
    assert_eq!(heap.dict_get(dict, &Value::Num(2.0)).unwrap(), None);
}

#[test]
fn negative_zero_and_zero_share_a_slot() {
    let mut heap = Heap::new();
    let mut vm = VmState::new(0);

    let dict = heap.allocate(HeapData::Dict(Dict::new()), vm.gc_roots()).unwrap();
    vm.stack.push(Value::Ref(dict));

    heap.dict_insert(dict, Value::Num(0.0), Value::Num(1.0)).unwrap();
    let previous = heap.dict_insert(dict, Value::Num(-0.0), Value::Num(2.0)).unwrap();
    assert_eq!(previous, Some(Value::Num(1.0)));
}

#[test]
fn dict_operations_require_a_dict() {
    let mut heap = Heap::new();
    let mut vm = VmState::new(0);

    let list = heap.allocate(HeapData::List(List::new()), vm.gc_roots()).unwrap();
    vm.stack.push(Value::Ref(list));

    let error = heap.dict_get(list, &Value::None).unwrap_err();
    assert_eq!(error.kind(), BuiltinExc::DictError);
}

#[test]
fn set_membership_and_deduplication() {
    let mut heap = Heap::new();
    let mut vm = VmState::new(0);

    let set = heap.allocate(HeapData::Set(Set::new()), vm.gc_roots()).unwrap();
    vm.stack.push(Value::Ref(set));

    assert!(heap.set_insert(set, Value::Num(3.0)).unwrap());
    assert!(!heap.set_insert(set, Value::Num(3.0)).unwrap());
    assert!(heap.set_contains(set, &Value::Num(3.0)).unwrap());
    assert!(!heap.set_contains(set, &Value::Num(4.0)).unwrap());

    let member = alloc_str(&mut heap, &mut vm, "tag");
    assert!(heap.set_insert(set, member).unwrap());
    let same_content = alloc_str(&mut heap, &mut vm, "tag");
    assert!(!heap.set_insert(set, same_content).unwrap());
}

#[test]
fn instance_attributes_set_get_and_replace() {
    let mut heap = Heap::new();
    let mut vm = VmState::new(0);

    let object = heap.allocate(HeapData::Instance(Instance::new()), vm.gc_roots()).unwrap();
    vm.stack.push(Value::Ref(object));

    assert_eq!(heap.instance_set_attr(object, "count", Value::Num(1.0)).unwrap(), None);
    assert_eq!(
        heap.instance_set_attr(object, "count", Value::Num(2.0)).unwrap(),
        Some(Value::Num(1.0))
    );
    assert_eq!(heap.instance_get_attr(object, "count").unwrap(), Some(Value::Num(2.0)));
    assert_eq!(heap.instance_get_attr(object, "missing").unwrap(), None);
}

#[test]
fn instance_attributes_keep_referents_alive() {
    let mut heap = Heap::new();
    let mut vm = VmState::new(0);

    let object = heap.allocate(HeapData::Instance(Instance::new()), vm.gc_roots()).unwrap();
    vm.stack.push(Value::Ref(object));
    let payload = heap.allocate(HeapData::Str("held".into()), vm.gc_roots()).unwrap();
    heap.instance_set_attr(object, "payload", Value::Ref(payload)).unwrap();

    let removed = heap.collect_garbage(vm.gc_roots()).unwrap();
    assert_eq!(removed, 0);
    assert!(matches!(heap.get(payload), HeapData::Str(s) if &**s == "held"));
}

#[test]
fn set_members_keep_referents_alive() {
    let mut heap = Heap::new();
    let mut vm = VmState::new(0);

    let set = heap.allocate(HeapData::Set(Set::new()), vm.gc_roots()).unwrap();
    vm.stack.push(Value::Ref(set));
    let member = heap.allocate(HeapData::Str("member".into()), vm.gc_roots()).unwrap();
    heap.set_insert(set, Value::Ref(member)).unwrap();

    assert_eq!(heap.collect_garbage(vm.gc_roots()).unwrap(), 0);
    assert!(matches!(heap.get(member), HeapData::Str(s) if &**s == "member"));
}

#[test]
fn dict_entries_keep_keys_and_values_alive() {
    let mut heap = Heap::new();
    let mut vm = VmState::new(0);

    let dict = heap.allocate(HeapData::Dict(Dict::new()), vm.gc_roots()).unwrap();
    vm.stack.push(Value::Ref(dict));
    let key = heap.allocate(HeapData::Str("key".into()), vm.gc_roots()).unwrap();
    let value = heap.allocate(HeapData::Str("value".into()), vm.gc_roots()).unwrap();
    heap.dict_insert(dict, Value::Ref(key), Value::Ref(value)).unwrap();

    assert_eq!(heap.collect_garbage(vm.gc_roots()).unwrap(), 0);
    assert!(matches!(heap.get(key), HeapData::Str(s) if &**s == "key"));
    assert!(matches!(heap.get(value), HeapData::Str(s) if &**s == "value"));
}

#[test]
fn value_rendering() {
    let mut heap = Heap::new();
    let mut vm = VmState::new(0);

    let text = heap.allocate(HeapData::Str("hi".into()), vm.gc_roots()).unwrap();
    vm.stack.push(Value::Ref(text));
    let list = heap
        .allocate(
            HeapData::List(List::from_values(vec![
                Value::Num(1.0),
                Value::Bool(true),
                Value::Ref(text),
                Value::None,
            ])),
            vm.gc_roots(),
        )
        .unwrap();
    vm.stack.push(Value::Ref(list));

    assert_eq!(heap.render_value(&Value::Ref(text)), "hi");
    assert_eq!(heap.render_value(&Value::Ref(list)), "[1.0, true, \"hi\", none]");
    assert_eq!(heap.render_value(&Value::Num(2.5)), "2.5");
}
