//! Module assembler.
//!
//! Orchestrates the metering pipeline:
//! 1. Validate the input module
//! 2. Resolve (or inject) the gas import
//! 3. Reserve types and check the index-space limits
//! 4. Meter every function body, in parallel when enabled
//! 5. Synthesize and meter the bootstrap routines
//! 6. Append the memory-grow charger
//! 7. Merge everything into the output module, in index order

use gasm_types::{
    ExportKind, FuncType, Function, Import, ImportKind, Instruction, Module, ValType,
};
use log::{debug, info, warn};

use crate::bootstrap::{synthesize, BootstrapLayout};
use crate::config::{GasImport, IndexLimits, MeterConfig};
use crate::consts::NAME_SECTION_NAME;
use crate::error::{MeterError, MeterResult};
use crate::grow::{grow_counter, uses_memory_grow};
use crate::inject::{Injector, MeteredFunction};
use crate::report::{BootstrapReport, FunctionKind, FunctionReport, MeterReport};
use crate::validate::validate_input;

// ══════════════════════════════════════════════════════════════════════════════
// Public API
// ══════════════════════════════════════════════════════════════════════════════

/// A metered module and what was done to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Metered {
    pub module: Module,
    pub report: MeterReport,
}

/// Meter `module` under `config`.
///
/// The input is never modified. Any failure aborts the whole request; a
/// partially metered module is never returned.
pub fn meter(module: &Module, config: &MeterConfig) -> MeterResult<Metered> {
    Assembler::new(module, config).assemble()
}

// ══════════════════════════════════════════════════════════════════════════════
// Assembler
// ══════════════════════════════════════════════════════════════════════════════

struct Assembler<'a> {
    input: &'a Module,
    config: &'a MeterConfig,
}

/// Output indices of everything the pass appends.
struct Plan {
    gas: u32,
    gas_injected: bool,
    void_type: Option<u32>,
    grow_type: Option<u32>,
    post_instantiate: u32,
    runtime_init: u32,
    grow: Option<u32>,
}

impl<'a> Assembler<'a> {
    fn new(input: &'a Module, config: &'a MeterConfig) -> Self {
        Self { input, config }
    }

    fn assemble(&self) -> MeterResult<Metered> {
        let existing_gas = validate_input(self.input, self.config)?;
        let mut out = self.input.clone();
        let plan = self.plan(&mut out, existing_gas)?;

        let table = &self.config.cost_table;
        let mut injector = Injector::new(table, plan.gas);
        if let Some(grow) = plan.grow {
            injector = injector.with_grow_function(grow);
        }

        // ── Original functions ───────────────────────────────────────────
        let metered = self.meter_functions(&injector, &out.functions)?;
        let mut report = MeterReport::new(plan.gas, plan.gas_injected);
        let imported = out.imported_function_count();
        for (i, (function, result)) in out.functions.iter_mut().zip(metered).enumerate() {
            let index = imported + i as u32;
            report
                .functions
                .push(function_report(index, FunctionKind::Original, &result));
            function.body = result.function.body;
        }

        // ── Bootstrap ────────────────────────────────────────────────────
        if let (Some(bootstrap), Some(void_type)) = (&self.config.bootstrap, plan.void_type) {
            let layout = BootstrapLayout {
                void_type,
                first_global: out.global_space() as u32,
                post_instantiate_index: plan.post_instantiate,
                runtime_init_index: plan.runtime_init,
            };
            let synthesized = synthesize(&out, bootstrap, layout)?;
            let post = injector.meter_function(plan.post_instantiate, &synthesized.post_instantiate)?;
            let init = injector.meter_function(plan.runtime_init, &synthesized.runtime_init)?;

            report.functions.push(function_report(
                plan.post_instantiate,
                FunctionKind::PostInstantiate,
                &post,
            ));
            report.functions.push(function_report(
                plan.runtime_init,
                FunctionKind::RuntimeInit,
                &init,
            ));
            report.bootstrap = Some(BootstrapReport {
                post_instantiate: plan.post_instantiate,
                runtime_init: plan.runtime_init,
                globals: synthesized.relocation,
            });

            out.functions.push(post.function);
            out.functions.push(init.function);
            out.globals.extend(synthesized.globals.iter().cloned());
            out.exports.extend(synthesized.exports());
            out.customs.push(synthesized.custom_section());
            debug!(
                "bootstrap: {} at func[{}], {} fixups, static data {} bytes",
                bootstrap.post_instantiate_export,
                plan.post_instantiate,
                bootstrap.fixups.len(),
                bootstrap.static_data_size
            );
        }

        // ── Memory-grow charger ──────────────────────────────────────────
        if let (Some(grow), Some(grow_type)) = (plan.grow, plan.grow_type) {
            out.functions
                .push(grow_counter(grow_type, table.memory_grow_per_page, plan.gas)?);
            report.grow_function = Some(grow);
        }

        for entry in &mut report.functions {
            entry.export = out.export_name_of_function(entry.index).map(str::to_string);
        }

        info!(
            "metered {} functions: {} charges, static cost {}",
            report.functions.len(),
            report.total_charges(),
            report.total_static_cost()
        );
        Ok(Metered {
            module: out,
            report,
        })
    }

    // ── Planning ─────────────────────────────────────────────────────────

    fn plan(&self, out: &mut Module, existing_gas: Option<u32>) -> MeterResult<Plan> {
        let (gas, gas_injected) = match existing_gas {
            Some(index) => (index, false),
            None => (inject_gas_import(out, &self.config.gas_import), true),
        };

        let grows = self.config.cost_table.meters_memory_grow() && uses_memory_grow(out);
        let void_type = self
            .config
            .bootstrap
            .as_ref()
            .map(|_| ensure_type(out, FuncType::new(vec![], vec![])));
        let grow_type =
            grows.then(|| ensure_type(out, FuncType::new(vec![ValType::I32], vec![ValType::I32])));

        let (bootstrap_functions, new_globals) = if void_type.is_some() { (2, 4) } else { (0, 0) };
        let new_functions = bootstrap_functions + u64::from(grows);
        check_limits(
            &self.config.limits,
            out.types.len() as u64,
            out.function_space() + new_functions,
            out.global_space() + new_globals,
        )?;

        let next = out.function_space() as u32;
        let post_instantiate = next;
        let runtime_init = next + 1;
        let grow = grows.then(|| if void_type.is_some() { next + 2 } else { next });

        Ok(Plan {
            gas,
            gas_injected,
            void_type,
            grow_type,
            post_instantiate,
            runtime_init,
            grow,
        })
    }

    // ── Metering ─────────────────────────────────────────────────────────

    /// Meter the defined functions; results come back in index order.
    ///
    /// Error locations use input function indices, which differ from the
    /// output ones once the gas import was injected.
    fn meter_functions(
        &self,
        injector: &Injector<'_>,
        functions: &[Function],
    ) -> MeterResult<Vec<MeteredFunction>> {
        let imported = self.input.imported_function_count();
        let run = |(i, function): (usize, &Function)| -> MeterResult<MeteredFunction> {
            let index = imported + i as u32;
            let metered = injector.meter_function(index, function)?;
            debug!(
                "func[{index}]: {} blocks, {} charges, static cost {}",
                metered.blocks, metered.charges, metered.static_cost
            );
            Ok(metered)
        };

        #[cfg(feature = "parallel")]
        if self.config.parallel {
            use rayon::prelude::*;
            return functions.par_iter().enumerate().map(&run).collect();
        }

        functions.iter().enumerate().map(run).collect()
    }
}

fn function_report(index: u32, kind: FunctionKind, metered: &MeteredFunction) -> FunctionReport {
    FunctionReport {
        index,
        export: None,
        kind,
        blocks: metered.blocks,
        charges: metered.charges,
        static_cost: metered.static_cost,
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Index-space helpers
// ══════════════════════════════════════════════════════════════════════════════

/// Index of `ty` in the type section, appending it if absent.
fn ensure_type(module: &mut Module, ty: FuncType) -> u32 {
    match module.find_type(&ty) {
        Some(index) => index,
        None => {
            module.types.push(ty);
            (module.types.len() - 1) as u32
        }
    }
}

fn check_limits(limits: &IndexLimits, types: u64, functions: u64, globals: u64) -> MeterResult<()> {
    let spaces = [
        ("type", types, limits.types),
        ("function", functions, limits.functions),
        ("global", globals, limits.globals),
    ];
    for (space, required, limit) in spaces {
        if required > u64::from(limit) {
            return Err(MeterError::IndexSpaceOverflow {
                space,
                required,
                limit,
            });
        }
    }
    Ok(())
}

/// Append the gas import and shift every defined-function reference.
///
/// The import lands after the existing function imports, so every
/// defined function moves up by one.
fn inject_gas_import(module: &mut Module, import: &GasImport) -> u32 {
    let ty = ensure_type(module, FuncType::new(vec![ValType::I32], vec![]));
    let index = module.imported_function_count();
    module.imports.push(Import::new(
        import.module.clone(),
        import.name.clone(),
        ImportKind::Function(ty),
    ));
    shift_function_indices(module, index);

    let before = module.customs.len();
    module.customs.retain(|c| c.name != NAME_SECTION_NAME);
    if module.customs.len() != before {
        warn!("dropped the `{NAME_SECTION_NAME}` section: function indices shifted");
    }
    debug!("injected gas import `{}.{}` as func[{index}]", import.module, import.name);
    index
}

fn shift_function_indices(module: &mut Module, from: u32) {
    let shift = |f: &mut u32| {
        if *f >= from {
            *f += 1;
        }
    };
    for function in &mut module.functions {
        for instr in &mut function.body {
            if let Instruction::Call(f) = instr {
                shift(f);
            }
        }
    }
    for export in &mut module.exports {
        if export.kind == ExportKind::Function {
            shift(&mut export.index);
        }
    }
    for segment in &mut module.elements {
        segment.functions.iter_mut().for_each(shift);
    }
    if let Some(start) = &mut module.start {
        shift(start);
    }
}
