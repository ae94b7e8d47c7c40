use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, FnArg, ItemFn, Pat, Type};

/// Time a navigation phase when the `perf_stats` feature is enabled.
///
/// The function body is wrapped in a drop guard that logs the elapsed time
/// through `bevy::log::info!` once the phase returns. Without `perf_stats`
/// the attribute expands to the original function untouched.
///
/// # Tick detection
///
/// If the function takes a parameter whose type mentions `SimTick`
/// (by value or by reference), the guard also logs every 100th tick even
/// when the phase was fast, so long runs get a steady sample.
///
/// # Example
/// ```ignore
/// #[profile(2)] // log when slower than 2ms
/// fn rebuild_dirty_layers(&mut self, tick: SimTick) { /* ... */ }
/// ```
#[proc_macro_attribute]
pub fn profile(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);

    let threshold_ms: u128 = if attr.is_empty() {
        1
    } else {
        attr.to_string().trim().parse().unwrap_or(1)
    };

    let attrs = &input.attrs;
    let vis = &input.vis;
    let sig = &input.sig;
    let block = &input.block;
    let phase_name = sig.ident.to_string();

    let tick_ident = sig.inputs.iter().find_map(|arg| {
        let FnArg::Typed(pat_type) = arg else {
            return None;
        };
        let Pat::Ident(pat_ident) = &*pat_type.pat else {
            return None;
        };
        if mentions_sim_tick(&pat_type.ty) {
            Some(pat_ident.ident.clone())
        } else {
            None
        }
    });

    let tick_expr = match &tick_ident {
        Some(ident) => quote! { Some(#ident.0) },
        None => quote! { None },
    };

    let output = quote! {
        #(#attrs)*
        #vis #sig {
            #[cfg(feature = "perf_stats")]
            let _phase_timer = {
                struct PhaseTimer {
                    name: &'static str,
                    start: std::time::Instant,
                    tick: Option<u64>,
                }
                impl Drop for PhaseTimer {
                    fn drop(&mut self) {
                        let elapsed = self.start.elapsed();
                        let sampled = self.tick.map_or(false, |t| t % 100 == 0);
                        if elapsed.as_millis() > #threshold_ms || sampled {
                            bevy::log::info!("[PERF] {} (tick {:?}): {:?}", self.name, self.tick, elapsed);
                        }
                    }
                }
                PhaseTimer {
                    name: #phase_name,
                    start: std::time::Instant::now(),
                    tick: #tick_expr,
                }
            };

            #block
        }
    };

    output.into()
}

fn mentions_sim_tick(ty: &Type) -> bool {
    match ty {
        Type::Reference(reference) => mentions_sim_tick(&reference.elem),
        Type::Path(path) => path
            .path
            .segments
            .last()
            .map_or(false, |segment| segment.ident == "SimTick"),
        _ => false,
    }
}
