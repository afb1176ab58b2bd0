//! End-to-end tests: WAT → binary → instrument → validate → run under wasmi.
//!
//! The host implements `env.gas` by adding every charge to a counter, so
//! each test can compare the gas actually paid at run time with the
//! static charges the pass computed.

use gasm_meter::{
    BootstrapConfig, BootstrapManifest, CostTable, Fixup, GasImportMode, IndexLimits, MeterConfig,
};
use gasm_pipeline::{
    cost_table_fingerprint, decode_module, instrument, instrument_to_result,
    instrument_with_report, PipelineError,
};
use gasm_types::{ErrorCode, ErrorKind, Instruction, InstructionClass, Location};

// ══════════════════════════════════════════════════════════════════════════════
// Runner
// ══════════════════════════════════════════════════════════════════════════════

/// Host state: gas paid so far.
#[derive(Default)]
struct GasMeter {
    used: u64,
    charges: u32,
    /// Trap once `used` would exceed this.
    limit: Option<u64>,
}

struct Runner {
    store: wasmi::Store<GasMeter>,
    instance: wasmi::Instance,
}

impl Runner {
    fn new(wasm: &[u8]) -> Self {
        Self::with_host(wasm, GasMeter::default(), &[])
    }

    /// Instantiate with `env.<name>` immutable i32 globals.
    fn with_globals(wasm: &[u8], globals: &[(&str, i32)]) -> Self {
        Self::with_host(wasm, GasMeter::default(), globals)
    }

    fn with_limit(wasm: &[u8], limit: u64) -> Self {
        let host = GasMeter {
            limit: Some(limit),
            ..GasMeter::default()
        };
        Self::with_host(wasm, host, &[])
    }

    fn with_host(wasm: &[u8], host: GasMeter, globals: &[(&str, i32)]) -> Self {
        let engine = wasmi::Engine::default();
        let module = wasmi::Module::new(&engine, wasm).expect("failed to parse WASM module");
        let mut store = wasmi::Store::new(&engine, host);
        let mut linker = <wasmi::Linker<GasMeter>>::new(&engine);

        // env.gas(amount: i32)
        linker
            .func_wrap(
                "env",
                "gas",
                |mut caller: wasmi::Caller<'_, GasMeter>, amount: i32| -> Result<(), wasmi::Error> {
                    let meter = caller.data_mut();
                    meter.used += amount as u64;
                    meter.charges += 1;
                    match meter.limit {
                        Some(limit) if meter.used > limit => Err(wasmi::Error::new("out of gas")),
                        _ => Ok(()),
                    }
                },
            )
            .expect("link gas");

        for (name, value) in globals {
            let global = wasmi::Global::new(
                &mut store,
                wasmi::Val::I32(*value),
                wasmi::Mutability::Const,
            );
            linker.define("env", name, global).expect("link global");
        }

        let instance = linker
            .instantiate(&mut store, &module)
            .expect("instantiation failed")
            .start(&mut store)
            .expect("start failed");

        Self { store, instance }
    }

    fn call_unary(&mut self, name: &str, arg: i32) -> i32 {
        self.try_call_unary(name, arg).expect("call trapped")
    }

    fn try_call_unary(&mut self, name: &str, arg: i32) -> Result<i32, wasmi::Error> {
        let func = self
            .instance
            .get_typed_func::<i32, i32>(&self.store, name)
            .expect("no such export");
        func.call(&mut self.store, arg)
    }

    fn call_nullary(&mut self, name: &str) -> i32 {
        self.try_call_nullary(name).expect("call trapped")
    }

    fn try_call_nullary(&mut self, name: &str) -> Result<i32, wasmi::Error> {
        let func = self
            .instance
            .get_typed_func::<(), i32>(&self.store, name)
            .expect("no such export");
        func.call(&mut self.store, ())
    }

    fn call_void(&mut self, name: &str) -> Result<(), wasmi::Error> {
        let func = self
            .instance
            .get_typed_func::<(), ()>(&self.store, name)
            .expect("no such export");
        func.call(&mut self.store, ())
    }

    fn global(&self, name: &str) -> i32 {
        self.instance
            .get_global(&self.store, name)
            .expect("no such global")
            .get(&self.store)
            .i32()
            .expect("not an i32 global")
    }

    fn read_i32(&self, offset: usize) -> i32 {
        let memory = self
            .instance
            .get_memory(&self.store, "memory")
            .expect("no memory export");
        let data = memory.data(&self.store);
        i32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
    }

    fn gas(&self) -> u64 {
        self.store.data().used
    }

    fn charges(&self) -> u32 {
        self.store.data().charges
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn wasm(text: &str) -> Vec<u8> {
    wat::parse_str(text).expect("invalid test WAT")
}

fn default_config() -> MeterConfig {
    MeterConfig::new(CostTable::default())
}

fn metered(text: &str) -> Vec<u8> {
    metered_with(text, &default_config())
}

fn metered_with(text: &str, config: &MeterConfig) -> Vec<u8> {
    let out = instrument(&wasm(text), config).expect("instrumentation failed");
    wasmparser::validate(&out).expect("output does not validate");
    out
}

const ARITH: &str = r#"(module
    (import "env" "gas" (func $gas (param i32)))
    (func $double (param i32) (result i32)
        local.get 0
        local.get 0
        i32.add)
    (func (export "quad") (param i32) (result i32)
        local.get 0
        call $double
        call $double)
    (func (export "abs") (param i32) (result i32)
        local.get 0
        i32.const 0
        i32.lt_s
        if (result i32)
            i32.const 0
            local.get 0
            i32.sub
        else
            local.get 0
        end)
    (func (export "sum") (param $n i32) (result i32) (local $acc i32)
        block
            loop
                local.get $n
                i32.eqz
                br_if 1
                local.get $acc
                local.get $n
                i32.add
                local.set $acc
                local.get $n
                i32.const 1
                i32.sub
                local.set $n
                br 0
            end
        end
        local.get $acc))"#;

// ══════════════════════════════════════════════════════════════════════════════
// Semantic preservation and exact gas
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn results_are_unchanged_by_metering() {
    let plain = wasm(ARITH);
    let out = metered(ARITH);

    let mut before = Runner::new(&plain);
    let mut after = Runner::new(&out);
    for arg in [-7, 0, 3, 12] {
        assert_eq!(before.call_unary("abs", arg), after.call_unary("abs", arg));
        assert_eq!(before.call_unary("quad", arg), after.call_unary("quad", arg));
    }
    for n in [0, 1, 10] {
        assert_eq!(before.call_unary("sum", n), after.call_unary("sum", n));
    }
    assert_eq!(before.gas(), 0);
}

#[test]
fn branches_pay_only_for_the_path_taken() {
    let out = metered(ARITH);

    let mut negative = Runner::new(&out);
    assert_eq!(negative.call_unary("abs", -5), 5);
    // condition (4) + then-arm (3)
    assert_eq!(negative.gas(), 7);

    let mut positive = Runner::new(&out);
    assert_eq!(positive.call_unary("abs", 5), 5);
    // condition (4) + else-arm (1)
    assert_eq!(positive.gas(), 5);
}

#[test]
fn loops_pay_per_iteration() {
    let out = metered(ARITH);
    for n in [0u64, 1, 4, 25] {
        let mut runner = Runner::new(&out);
        let result = runner.call_unary("sum", n as i32);
        assert_eq!(result as u64, n * (n + 1) / 2);
        // block + loop + exit (1 each) + head (3) per test + body (9) per iteration
        assert_eq!(runner.gas(), 6 + 12 * n, "n = {n}");
    }
}

const DEAD_CODE: &str = r#"(module
    (import "env" "gas" (func (param i32)))
    (func (export "pick") (param i32) (result i32)
        block
            block
                local.get 0
                br_table 0 1
                i32.const 99
                drop
            end
            i32.const 10
            return
            i32.const 20
            drop
        end
        i32.const 30)
    (func (export "trap") (result i32)
        unreachable
        i32.const 1
        i32.const 2
        i32.add))"#;

#[test]
fn dead_code_after_transfers_stays_valid() {
    // `metered_with` runs the binary validator on the output.
    let out = metered(DEAD_CODE);
    let mut runner = Runner::new(&out);

    // block, block, local.get + br_table, then i32.const + return
    assert_eq!(runner.call_unary("pick", 0), 10);
    assert_eq!(runner.gas(), 1 + 1 + 2 + 2);

    // block, block, local.get + br_table, then i32.const 30
    let mut runner = Runner::new(&out);
    assert_eq!(runner.call_unary("pick", 1), 30);
    assert_eq!(runner.gas(), 1 + 1 + 2 + 1);

    let mut runner = Runner::new(&out);
    assert_eq!(runner.call_unary("pick", 7), 30);
    assert_eq!(runner.gas(), 5);

    // The charge for the unreachable tail is never paid.
    let mut runner = Runner::new(&out);
    assert!(runner.try_call_nullary("trap").is_err());
    assert_eq!(runner.gas(), 1);
    assert_eq!(runner.charges(), 1);
}

#[test]
fn calls_charge_callee_and_caller() {
    let out = metered(ARITH);
    let mut runner = Runner::new(&out);
    assert_eq!(runner.call_unary("quad", 3), 12);
    // quad: [local.get call] + [call]; double: 3 per call
    assert_eq!(runner.gas(), 2 + 1 + 3 * 2);
    assert_eq!(runner.charges(), 4);
}

#[test]
fn report_matches_static_cost() {
    let out = instrument_with_report(&wasm(ARITH), &default_config()).unwrap();
    let sum = out.report.find_by_export("sum").unwrap();
    // Every instruction except the two `end`s costs 1.
    assert_eq!(sum.static_cost, 15);
    assert_eq!(sum.blocks, 6);
    assert_eq!(sum.charges, 5);

    let abs = out.report.find_by_export("abs").unwrap();
    assert_eq!(abs.static_cost, 8);
    assert_eq!(abs.charges, 3);
    assert!(!out.report.gas_import_injected);
    assert_eq!(out.report.gas_function, 0);
}

#[test]
fn charge_is_paid_before_the_block_executes() {
    let text = r#"(module
        (import "env" "gas" (func (param i32)))
        (memory (export "memory") 1)
        (func (export "write")
            i32.const 0
            i32.const 42
            i32.store))"#;
    let out = metered(text);

    let mut starved = Runner::with_limit(&out, 2);
    assert!(starved.call_void("write").is_err());
    assert_eq!(starved.read_i32(0), 0);

    let mut funded = Runner::with_limit(&out, 3);
    funded.call_void("write").unwrap();
    assert_eq!(funded.read_i32(0), 42);
    assert_eq!(funded.gas(), 3);
}

#[test]
fn custom_cost_table_is_applied() {
    let table = CostTable::default()
        .with_class_cost(InstructionClass::Call, 10)
        .with_override("i32.add", 5);
    let out = metered_with(ARITH, &MeterConfig::new(table));
    let mut runner = Runner::new(&out);
    runner.call_unary("quad", 1);
    // quad: 1 + 10 + 10; double: 1 + 1 + 5 per call
    assert_eq!(runner.gas(), 21 + 2 * 7);
}

#[test]
fn output_is_deterministic() {
    let input = wasm(ARITH);
    let a = instrument(&input, &default_config()).unwrap();
    let b = instrument(&input, &default_config()).unwrap();
    let c = instrument(&input, &default_config().sequential()).unwrap();
    assert_eq!(a, b);
    assert_eq!(a, c);
}

// ══════════════════════════════════════════════════════════════════════════════
// Gas import modes
// ══════════════════════════════════════════════════════════════════════════════

const NO_GAS_IMPORT: &str = r#"(module
    (type $r (func (result i32)))
    (table 1 funcref)
    (func $helper (result i32)
        i32.const 7)
    (func (export "run") (result i32)
        call $helper)
    (func (export "indirect") (result i32)
        i32.const 0
        call_indirect (type $r))
    (elem (i32.const 0) $helper))"#;

#[test]
fn require_mode_rejects_missing_gas_import() {
    let err = instrument(&wasm(NO_GAS_IMPORT), &default_config()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(matches!(err, PipelineError::Meter(_)));
}

#[test]
fn inject_mode_adds_the_import_and_shifts_references() {
    let config = default_config().with_gas_mode(GasImportMode::Inject);
    let out = metered_with(NO_GAS_IMPORT, &config);

    let module = decode_module(&out).unwrap();
    assert_eq!(module.find_function_import("env", "gas"), Some(0));
    assert_eq!(module.find_export("run").unwrap().index, 2);
    assert_eq!(module.elements[0].functions, vec![1]);
    assert!(module.customs.iter().all(|c| c.name != "name"));

    let mut runner = Runner::new(&out);
    assert_eq!(runner.call_nullary("run"), 7);
    assert_eq!(runner.gas(), 1 + 1);

    let mut runner = Runner::new(&out);
    assert_eq!(runner.call_nullary("indirect"), 7);
    assert_eq!(runner.gas(), 2 + 1);
}

#[test]
fn require_mode_keeps_the_name_section() {
    let text = r#"(module
        (import "env" "gas" (func $gas (param i32)))
        (func $named (result i32) i32.const 1))"#;
    let out = metered(text);
    let module = decode_module(&out).unwrap();
    assert!(module.customs.iter().any(|c| c.name == "name"));
}

// ══════════════════════════════════════════════════════════════════════════════
// Bootstrap
// ══════════════════════════════════════════════════════════════════════════════

const RELOCATABLE: &str = r#"(module
    (import "env" "gas" (func (param i32)))
    (import "env" "tableBase" (global i32))
    (import "env" "memoryBase" (global i32))
    (memory (export "memory") 1)
    (func (export "one") (result i32)
        i32.const 1))"#;

#[test]
fn post_instantiate_sets_relocation_globals() {
    let config = default_config().with_bootstrap(BootstrapConfig::new(128));
    let out = metered_with(RELOCATABLE, &config);

    for table_base in [0, 32, -64, i32::MAX] {
        let mut runner =
            Runner::with_globals(&out, &[("tableBase", table_base), ("memoryBase", 8)]);
        assert_eq!(runner.global("__relocation_base"), 0);
        assert_eq!(runner.global("__relocation_offset"), 0);
        assert_eq!(runner.global("__static_data_size"), 128);

        runner.call_void("__post_instantiate").unwrap();
        assert_eq!(runner.global("__relocation_base"), table_base, "tableBase = {table_base}");
        assert_eq!(
            runner.global("__relocation_offset"),
            table_base.wrapping_add(128),
            "tableBase = {table_base}"
        );
        // Guard (2) + relocation (9); no fixups.
        assert_eq!(runner.gas(), 11);

        assert_eq!(runner.call_nullary("one"), 1);
    }
}

#[test]
fn post_instantiate_runs_only_once() {
    let bootstrap = BootstrapConfig::new(64).with_fixup(Fixup::table(20, 1));
    let config = default_config().with_bootstrap(bootstrap);
    let out = metered_with(RELOCATABLE, &config);

    let mut runner = Runner::with_globals(&out, &[("tableBase", 32), ("memoryBase", 8)]);
    runner.call_void("__post_instantiate").unwrap();
    assert_eq!(runner.gas(), 11 + 5);
    let charges = runner.charges();

    runner.call_void("__post_instantiate").unwrap();
    runner.call_void("__post_instantiate").unwrap();
    assert_eq!(runner.global("__relocation_base"), 32);
    assert_eq!(runner.global("__relocation_offset"), 32 + 64);
    assert_eq!(runner.read_i32(8 + 20), 32 + 1);
    // A repeat call only pays for the flag check and the early return.
    assert_eq!(runner.gas(), 11 + 5 + 2 * 3);
    assert_eq!(runner.charges(), charges + 2 * 2);
}

#[test]
fn run_post_sets_applies_fixups() {
    let bootstrap = BootstrapConfig::new(64)
        .with_fixup(Fixup::memory(16, 4))
        .with_fixup(Fixup::table(20, 1));
    let config = default_config().with_bootstrap(bootstrap);
    let out = metered_with(RELOCATABLE, &config);

    let mut runner = Runner::with_globals(&out, &[("tableBase", 32), ("memoryBase", 8)]);
    runner.call_void("__post_instantiate").unwrap();

    // Written at memoryBase + address.
    assert_eq!(runner.read_i32(8 + 16), 8 + 4);
    assert_eq!(runner.read_i32(8 + 20), 32 + 1);
    assert_eq!(runner.gas(), 11 + 10);
}

#[test]
fn bootstrap_manifest_is_embedded() {
    let config = default_config().with_bootstrap(BootstrapConfig::new(16));
    let out = instrument_with_report(&wasm(RELOCATABLE), &config).unwrap();

    let module = decode_module(&out.wasm).unwrap();
    let manifest = BootstrapManifest::find(&module).expect("no bootstrap section");
    assert_eq!(manifest.entry, "__post_instantiate");
    assert_eq!(manifest.runtime_init, "runPostSets");
    assert_eq!(manifest.static_data_size, 16);

    let boot = out.report.bootstrap.expect("no bootstrap in report");
    assert_eq!(boot.post_instantiate, manifest.entry_index);
    assert_eq!(
        module.find_export("__post_instantiate").unwrap().index,
        boot.post_instantiate
    );
}

// ══════════════════════════════════════════════════════════════════════════════
// Memory growth
// ══════════════════════════════════════════════════════════════════════════════

const GROWER: &str = r#"(module
    (import "env" "gas" (func (param i32)))
    (memory 1)
    (func (export "grow") (param i32) (result i32)
        local.get 0
        memory.grow))"#;

#[test]
fn memory_grow_is_charged_per_page() {
    let config = MeterConfig::new(CostTable::default().with_grow_cost(10));
    let out = metered_with(GROWER, &config);

    let mut runner = Runner::new(&out);
    assert_eq!(runner.call_unary("grow", 3), 1);
    // static block (2) + 3 pages * 10
    assert_eq!(runner.gas(), 2 + 30);
    assert_eq!(runner.charges(), 2);
}

#[test]
fn memory_grow_charge_does_not_wrap() {
    let config = MeterConfig::new(CostTable::default().with_grow_cost(1 << 20));
    let out = metered_with(GROWER, &config);

    let mut runner = Runner::new(&out);
    // 4096 pages * 2^20 is 2^32, which would be 0 in i32 arithmetic.
    assert!(runner.try_call_unary("grow", 4096).is_err());
    // Only the static block was paid; the charger trapped before growing.
    assert_eq!(runner.gas(), 2);
    assert_eq!(runner.charges(), 1);

    // Memory is still one page, and a small request pays in full.
    assert_eq!(runner.call_unary("grow", 1), 1);
    assert_eq!(runner.gas(), 2 + 2 + (1 << 20));
}

#[test]
fn memory_grow_charge_up_to_i32_max_is_accepted() {
    let config = MeterConfig::new(CostTable::default().with_grow_cost(i32::MAX as u32));
    let out = metered_with(GROWER, &config);

    let mut runner = Runner::new(&out);
    assert_eq!(runner.call_unary("grow", 1), 1);
    assert_eq!(runner.gas(), 2 + i32::MAX as u64);

    assert!(runner.try_call_unary("grow", 2).is_err());
    assert_eq!(runner.call_unary("grow", 0), 2);
}

#[test]
fn memory_grow_is_static_by_default() {
    let out = metered(GROWER);
    let module = decode_module(&out).unwrap();
    assert!(module.functions[0]
        .body
        .iter()
        .any(|i| matches!(i, Instruction::MemoryGrow(0))));

    let mut runner = Runner::new(&out);
    assert_eq!(runner.call_unary("grow", 2), 1);
    assert_eq!(runner.gas(), 2);
}

// ══════════════════════════════════════════════════════════════════════════════
// Errors
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn forbidden_float_is_unsupported_opcode() {
    let text = r#"(module
        (import "env" "gas" (func (param i32)))
        (func (param f32 f32) (result f32)
            local.get 0
            local.get 1
            f32.add))"#;
    let config = MeterConfig::new(CostTable::default().with_forbidden_floats());
    let result = instrument_to_result(&wasm(text), &config);

    assert!(!result.success);
    assert!(result.wasm.is_none());
    let error = result.error.unwrap();
    assert_eq!(error.kind, ErrorKind::UnsupportedOpcode);
    assert_eq!(error.code, ErrorCode::UNSUPPORTED_OPCODE);
    assert_eq!(error.location, Some(Location::new(1, 2)));
}

#[test]
fn index_limits_are_enforced() {
    let config = default_config()
        .with_gas_mode(GasImportMode::Inject)
        .with_limits(IndexLimits {
            functions: 3,
            ..IndexLimits::default()
        });
    let err = instrument(&wasm(NO_GAS_IMPORT), &config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IndexSpaceOverflow);
}

#[test]
fn invalid_binary_is_rejected_before_metering() {
    let err = instrument(b"\0asm\x01\0\0\0\x01\x04\x01\x60\0", &default_config()).unwrap_err();
    assert!(matches!(err, PipelineError::InputValidation(_)));
    assert_eq!(err.to_report().code, ErrorCode::INVALID_INPUT);
}

#[test]
fn already_metered_module_is_rejected() {
    let once = metered(ARITH);
    let err = instrument(&once, &default_config()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

// ══════════════════════════════════════════════════════════════════════════════
// Serializable result
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn result_carries_fingerprints_and_round_trips() {
    let config = default_config();
    let result = instrument_to_result(&wasm(ARITH), &config);
    assert!(result.success);
    assert!(result.error.is_none());
    assert_eq!(result.cost_table_sha256, cost_table_fingerprint(&config.cost_table));
    assert_eq!(result.output_sha256.as_ref().map(String::len), Some(64));

    let json = serde_json::to_string(&result).unwrap();
    let back: gasm_pipeline::InstrumentResult = serde_json::from_str(&json).unwrap();
    assert_eq!(back.wasm, result.wasm);
    assert_eq!(back.report, result.report);
}

#[test]
fn failed_result_omits_output_fields() {
    let result = instrument_to_result(b"nope", &default_config());
    assert!(!result.success);
    let json = serde_json::to_string(&result).unwrap();
    assert!(!json.contains("\"wasm\""));
    assert!(!json.contains("output_sha256"));
    assert!(json.contains("cost_table_sha256"));
}
