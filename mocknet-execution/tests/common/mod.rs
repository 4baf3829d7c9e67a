// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Test contracts written in WebAssembly text, and helpers to build the messages sent to them.

#![allow(dead_code)]

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use mocknet_execution::{Backend, ContractDescriptor, InstantiateRequest};
use serde_json::{json, Value};

/// The sender of every top-level call in the tests.
pub const USER: &str = "mocked1user";

/// The allocator and region helpers shared by all test contracts.
///
/// Static data lives below 64 KiB, and regions are allocated above it by a bump allocator that
/// places each region's data right after its descriptor. Nothing is ever freed.
const PRELUDE: &str = r#"
  (memory (export "memory") 2)
  (global $heap (mut i32) (i32.const 65536))

  (func $allocate (export "allocate") (param $length i32) (result i32)
    (local $region i32)
    (local $end i32)
    (local.set $region (global.get $heap))
    (local.set $end (i32.add (local.get $region) (i32.add (local.get $length) (i32.const 12))))
    (if (i32.gt_u (local.get $end) (i32.mul (memory.size) (i32.const 65536)))
      (then
        (drop (memory.grow
          (i32.add
            (i32.const 1)
            (i32.div_u
              (i32.sub (local.get $end) (i32.mul (memory.size) (i32.const 65536)))
              (i32.const 65536)))))))
    (i32.store (local.get $region) (i32.add (local.get $region) (i32.const 12)))
    (i32.store offset=4 (local.get $region) (local.get $length))
    (i32.store offset=8 (local.get $region) (i32.const 0))
    (global.set $heap (local.get $end))
    (local.get $region))

  (func (export "deallocate") (param $region i32))

  (func $data (param $region i32) (result i32)
    (i32.load (local.get $region)))

  (func $length (param $region i32) (result i32)
    (i32.load offset=8 (local.get $region)))

  ;; A new region holding a copy of `length` bytes at `pointer`.
  (func $static (param $pointer i32) (param $length i32) (result i32)
    (local $region i32)
    (local.set $region (call $allocate (local.get $length)))
    (memory.copy (call $data (local.get $region)) (local.get $pointer) (local.get $length))
    (i32.store offset=8 (local.get $region) (local.get $length))
    (local.get $region))

  ;; A new region pointing at `length` bytes at `pointer`, without copying them.
  (func $view (param $pointer i32) (param $length i32) (result i32)
    (local $region i32)
    (local.set $region (call $allocate (i32.const 0)))
    (i32.store (local.get $region) (local.get $pointer))
    (i32.store offset=4 (local.get $region) (local.get $length))
    (i32.store offset=8 (local.get $region) (local.get $length))
    (local.get $region))
"#;

/// Data placed in a contract's memory when it is instantiated.
struct StaticData {
    next_offset: u32,
    segments: String,
}

/// The location of some static data.
#[derive(Clone, Copy)]
struct Segment {
    offset: u32,
    length: u32,
}

impl Segment {
    /// An expression creating a new region with a copy of this segment.
    fn region(&self) -> String {
        format!(
            "(call $static (i32.const {}) (i32.const {}))",
            self.offset, self.length
        )
    }
}

impl StaticData {
    fn new() -> Self {
        StaticData {
            next_offset: 1024,
            segments: String::new(),
        }
    }

    fn add(&mut self, bytes: impl AsRef<[u8]>) -> Segment {
        let bytes = bytes.as_ref();
        let segment = Segment {
            offset: self.next_offset,
            length: bytes.len() as u32,
        };
        let escaped: String = bytes.iter().map(|byte| format!("\\{byte:02x}")).collect();
        self.segments += &format!("(data (i32.const {}) \"{escaped}\")\n", segment.offset);
        self.next_offset += (segment.length + 8) & !7;
        assert!(self.next_offset < 65536, "too much static data");
        segment
    }
}

fn module(imports: &[&str], body: &str, data: StaticData) -> String {
    let imports: String = imports.iter().map(|import| import_declaration(import)).collect();
    format!("(module\n{imports}{PRELUDE}{body}\n{})", data.segments)
}

fn import_declaration(name: &str) -> String {
    let signature = match name {
        "db_read" | "query_chain" | "db_next_value" | "addr_validate" => "(param i32) (result i32)",
        "db_write" => "(param i32 i32)",
        "db_remove" | "debug" => "(param i32)",
        "db_scan" | "ed25519_verify" => "(param i32 i32 i32) (result i32)",
        "addr_canonicalize" | "addr_humanize" | "canonicalize_address" | "humanize_address" => {
            "(param i32 i32) (result i32)"
        }
        other => panic!("no test signature for import {other}"),
    };
    format!("  (import \"env\" \"{name}\" (func ${name} {signature}))\n")
}

/// The response of an entry point that has nothing to report.
fn empty_response(data: &mut StaticData) -> Segment {
    data.add(r#"{"ok":{"messages":[]}}"#)
}

/// A query response holding `value`.
pub fn query_response(value: &Value) -> String {
    format!(r#"{{"ok":"{}"}}"#, BASE64.encode(value.to_string()))
}

/// A counter, stored as a single byte under `count`.
///
/// It starts at zero, every execution increments it, and queries return `{"count": N}`.
pub fn counter() -> String {
    let mut data = StaticData::new();
    let key = data.add("count");
    let slot = data.add([0u8]);
    let ok = empty_response(&mut data);
    let entries: Vec<String> = (0..10)
        .map(|count| query_response(&json!({ "count": count })))
        .collect();
    let entry_length = entries[0].len();
    assert!(entries.iter().all(|entry| entry.len() == entry_length));
    let table = data.add(entries.concat());

    let body = format!(
        r#"
  (func $read_count (result i32)
    (local $value i32)
    (local.set $value (call $db_read {key}))
    (if (result i32) (i32.eqz (local.get $value))
      (then (i32.const 0))
      (else (i32.load8_u (call $data (local.get $value))))))

  (func $write_count (param $count i32)
    (i32.store8 (i32.const {slot_offset}) (local.get $count))
    (call $db_write {key} {slot}))

  (func (export "instantiate") (param $env i32) (param $info i32) (param $msg i32) (result i32)
    (call $write_count (i32.const 0))
    {ok})

  (func (export "execute") (param $env i32) (param $info i32) (param $msg i32) (result i32)
    (call $write_count (i32.add (call $read_count) (i32.const 1)))
    {ok})

  (func (export "query") (param $env i32) (param $msg i32) (result i32)
    (local $count i32)
    (local.set $count (call $read_count))
    (if (i32.gt_u (local.get $count) (i32.const 9))
      (then (local.set $count (i32.const 9))))
    (call $static
      (i32.add (i32.const {table_offset}) (i32.mul (local.get $count) (i32.const {entry_length})))
      (i32.const {entry_length})))
"#,
        key = key.region(),
        slot = slot.region(),
        slot_offset = slot.offset,
        ok = ok.region(),
        table_offset = table.offset,
    );
    module(&["db_read", "db_write"], &body, data)
}

/// A contract whose entry points return their message as their response.
///
/// Executing it with `null` traps.
pub fn echo() -> String {
    let body = r#"
  (func (export "instantiate") (param $env i32) (param $info i32) (param $msg i32) (result i32)
    (local.get $msg))

  (func (export "execute") (param $env i32) (param $info i32) (param $msg i32) (result i32)
    (if (i32.eq (call $length (local.get $msg)) (i32.const 4))
      (then unreachable))
    (local.get $msg))

  (func (export "query") (param $env i32) (param $msg i32) (result i32)
    (local.get $msg))
"#;
    module(&[], body, StaticData::new())
}

/// A contract storing its execution messages under the key `k`.
///
/// Executing it with `{}` stores an empty value and executing it with `null` removes the key.
/// Queries return the stored message as is, or `"absent"` or `"empty"`.
pub fn probe() -> String {
    let mut data = StaticData::new();
    let key = data.add("k");
    let empty = data.add("");
    let ok = empty_response(&mut data);
    let absent = data.add(query_response(&json!("absent")));
    let empty_value = data.add(query_response(&json!("empty")));

    let body = format!(
        r#"
  (func (export "instantiate") (param $env i32) (param $info i32) (param $msg i32) (result i32)
    {ok})

  (func (export "execute") (param $env i32) (param $info i32) (param $msg i32) (result i32)
    (local $size i32)
    (local.set $size (call $length (local.get $msg)))
    (if (i32.eq (local.get $size) (i32.const 2))
      (then (call $db_write {key} {empty}))
      (else
        (if (i32.eq (local.get $size) (i32.const 4))
          (then (call $db_remove {key}))
          (else (call $db_write {key} (local.get $msg))))))
    {ok})

  (func (export "query") (param $env i32) (param $msg i32) (result i32)
    (local $value i32)
    (local.set $value (call $db_read {key}))
    (if (i32.eqz (local.get $value))
      (then (return {absent})))
    (if (i32.eqz (call $length (local.get $value)))
      (then (return {empty_value})))
    (local.get $value))
"#,
        key = key.region(),
        empty = empty.region(),
        ok = ok.region(),
        absent = absent.region(),
        empty_value = empty_value.region(),
    );
    module(&["db_read", "db_write", "db_remove"], &body, data)
}

/// A contract built against the older ABI, taking snapshots of other contracts.
///
/// Its messages are `query_chain` requests. Executing it stores the response to the request under
/// `snap`, and queries return the stored response, or the response to the request if nothing is
/// stored yet. In both cases the outer `Ok` of the response is stripped.
pub fn snapshot() -> String {
    let mut data = StaticData::new();
    let key = data.add("snap");
    let ok = data.add(r#"{"Ok":{"messages":[],"log":[],"data":null}}"#);

    let body = format!(
        r#"
  (func (export "init") (param $env i32) (param $msg i32) (result i32)
    {ok})

  (func (export "handle") (param $env i32) (param $msg i32) (result i32)
    (call $db_write {key} (call $query_chain (local.get $msg)))
    {ok})

  (func (export "query") (param $msg i32) (result i32)
    (local $snapshot i32)
    (local.set $snapshot (call $db_read {key}))
    (if (i32.eqz (local.get $snapshot))
      (then (local.set $snapshot (call $query_chain (local.get $msg)))))
    (call $view
      (i32.add (call $data (local.get $snapshot)) (i32.const 6))
      (i32.sub (call $length (local.get $snapshot)) (i32.const 7))))
"#,
        key = key.region(),
        ok = ok.region(),
    );
    module(&["db_read", "db_write", "query_chain"], &body, data)
}

/// A contract built against the newer ABI, relaying `query_chain` requests.
///
/// It behaves like [`snapshot`], with the newer ABI's entry points and result tags.
pub fn relay() -> String {
    let mut data = StaticData::new();
    let key = data.add("snap");
    let ok = empty_response(&mut data);

    let body = format!(
        r#"
  (func (export "instantiate") (param $env i32) (param $info i32) (param $msg i32) (result i32)
    {ok})

  (func (export "execute") (param $env i32) (param $info i32) (param $msg i32) (result i32)
    (call $db_write {key} (call $query_chain (local.get $msg)))
    {ok})

  (func (export "query") (param $env i32) (param $msg i32) (result i32)
    (local $snapshot i32)
    (local.set $snapshot (call $db_read {key}))
    (if (i32.eqz (local.get $snapshot))
      (then (local.set $snapshot (call $query_chain (local.get $msg)))))
    (call $view
      (i32.add (call $data (local.get $snapshot)) (i32.const 6))
      (i32.sub (call $length (local.get $snapshot)) (i32.const 7))))
"#,
        key = key.region(),
        ok = ok.region(),
    );
    module(&["db_read", "db_write", "query_chain"], &body, data)
}

/// A contract built against the older ABI, converting the address sent as its handle message.
///
/// Results are stored like in [`addresses`]. Its `query` export also takes an environment, and
/// always returns `"legacy"`.
pub fn legacy_addresses() -> String {
    let mut data = StaticData::new();
    let error_key = data.add("error");
    let canonical_key = data.add("canonical");
    let human_key = data.add("human");
    let ok = data.add(r#"{"Ok":{"messages":[],"log":[],"data":null}}"#);
    let legacy = data.add(format!(
        r#"{{"Ok":"{}"}}"#,
        BASE64.encode(json!("legacy").to_string())
    ));

    let body = format!(
        r#"
  (func (export "init") (param $env i32) (param $msg i32) (result i32)
    {ok})

  (func (export "handle") (param $env i32) (param $msg i32) (result i32)
    (local $address i32)
    (local $error i32)
    (local $canonical i32)
    (local $human i32)
    (local.set $address
      (call $view
        (i32.add (call $data (local.get $msg)) (i32.const 1))
        (i32.sub (call $length (local.get $msg)) (i32.const 2))))
    (local.set $canonical (call $allocate (i32.const 64)))
    (local.set $error (call $canonicalize_address (local.get $address) (local.get $canonical)))
    (if (local.get $error)
      (then
        (call $db_write {error_key} (local.get $error))
        (return {ok})))
    (local.set $human (call $allocate (i32.const 128)))
    (drop (call $humanize_address (local.get $canonical) (local.get $human)))
    (call $db_write {canonical_key} (local.get $canonical))
    (call $db_write {human_key} (local.get $human))
    {ok})

  (func (export "query") (param $env i32) (param $msg i32) (result i32)
    {legacy})
"#,
        error_key = error_key.region(),
        canonical_key = canonical_key.region(),
        human_key = human_key.region(),
        ok = ok.region(),
        legacy = legacy.region(),
    );
    module(
        &["db_write", "canonicalize_address", "humanize_address"],
        &body,
        data,
    )
}

/// A contract converting the address sent as its execution message.
///
/// The canonical and human readable forms are stored under `canonical` and `human`, or the
/// validation error under `error`. Queries report whether a signature check passed.
pub fn addresses() -> String {
    let mut data = StaticData::new();
    let error_key = data.add("error");
    let canonical_key = data.add("canonical");
    let human_key = data.add("human");
    let ok = empty_response(&mut data);
    let rejected = data.add(query_response(&json!("rejected")));
    let accepted = data.add(query_response(&json!("accepted")));

    let body = format!(
        r#"
  (func (export "instantiate") (param $env i32) (param $info i32) (param $msg i32) (result i32)
    {ok})

  (func (export "execute") (param $env i32) (param $info i32) (param $msg i32) (result i32)
    (local $address i32)
    (local $error i32)
    (local $canonical i32)
    (local $human i32)
    ;; The message is a JSON string, so its quotes are dropped.
    (local.set $address
      (call $view
        (i32.add (call $data (local.get $msg)) (i32.const 1))
        (i32.sub (call $length (local.get $msg)) (i32.const 2))))
    (call $debug (local.get $address))
    (local.set $error (call $addr_validate (local.get $address)))
    (if (local.get $error)
      (then
        (call $db_write {error_key} (local.get $error))
        (return {ok})))
    (local.set $canonical (call $allocate (i32.const 64)))
    (drop (call $addr_canonicalize (local.get $address) (local.get $canonical)))
    (local.set $human (call $allocate (i32.const 128)))
    (drop (call $addr_humanize (local.get $canonical) (local.get $human)))
    (call $db_write {canonical_key} (local.get $canonical))
    (call $db_write {human_key} (local.get $human))
    {ok})

  (func (export "query") (param $env i32) (param $msg i32) (result i32)
    (if (i32.eq
          (call $ed25519_verify (local.get $msg) (local.get $msg) (local.get $msg))
          (i32.const 1))
      (then (return {rejected})))
    {accepted})
"#,
        error_key = error_key.region(),
        canonical_key = canonical_key.region(),
        human_key = human_key.region(),
        ok = ok.region(),
        rejected = rejected.region(),
        accepted = accepted.region(),
    );
    module(
        &[
            "db_write",
            "debug",
            "addr_validate",
            "addr_canonicalize",
            "addr_humanize",
            "ed25519_verify",
        ],
        &body,
        data,
    )
}

/// A contract storing each execution message under itself.
///
/// Querying it with `{}` returns the value of the first key, and with anything else the value of
/// the last key.
pub fn scanner() -> String {
    let mut data = StaticData::new();
    let ok = empty_response(&mut data);

    let body = format!(
        r#"
  (func (export "instantiate") (param $env i32) (param $info i32) (param $msg i32) (result i32)
    {ok})

  (func (export "execute") (param $env i32) (param $info i32) (param $msg i32) (result i32)
    (call $db_write (local.get $msg) (local.get $msg))
    {ok})

  (func (export "query") (param $env i32) (param $msg i32) (result i32)
    (call $db_next_value
      (call $db_scan
        (i32.const 0)
        (i32.const 0)
        (select
          (i32.const 1)
          (i32.const 2)
          (i32.eq (call $length (local.get $msg)) (i32.const 2))))))
"#,
        ok = ok.region(),
    );
    module(&["db_write", "db_scan", "db_next_value"], &body, data)
}

/// A module exporting none of the known entry points.
pub fn without_entry_points() -> String {
    module(&[], "", StaticData::new())
}

/// Uploads and instantiates a contract.
///
/// The instantiation message is an empty response, which the echo contract returns as is.
pub fn deploy(backend: &mut Backend, wat: &str, label: &str) -> ContractDescriptor {
    let upload = backend.upload(wat);
    let request = InstantiateRequest::new(upload.code_id, label, respond_with(vec![]));
    backend.instantiate(USER, request).unwrap()
}

/// Encodes a message as it is embedded in other messages.
pub fn encode(msg: &Value) -> String {
    BASE64.encode(msg.to_string())
}

/// A sub-message executing `msg` on the contract at `address`.
pub fn execute_message(address: &str, msg: &Value) -> Value {
    json!({
        "wasm": {
            "execute": {
                "contract_addr": address,
                "msg": encode(msg),
                "funds": [],
            }
        }
    })
}

/// A `query_chain` request running `msg` on the contract at `address`.
pub fn smart_query(address: &str, msg: &Value) -> Value {
    json!({
        "wasm": {
            "smart": {
                "contract_addr": address,
                "callback_code_hash": "",
                "msg": encode(msg),
            }
        }
    })
}

/// A successful response requesting `messages`, to be returned by the echo contract.
pub fn respond_with(messages: Vec<Value>) -> Value {
    json!({ "ok": { "messages": messages } })
}
