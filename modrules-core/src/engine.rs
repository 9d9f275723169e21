// modrules-core/src/engine.rs
use std::collections::BTreeSet;
use std::sync::Arc;

use modrules_common::dependency::resolver::resolve_descriptor;
use modrules_common::dependency::{Resolution, ResolveOptions, ResolvedDependencySet};
use modrules_common::error::{DescriptorError, DescriptorErrorKind};
use modrules_common::model::{Descriptor, ModuleId, TargetContext};
use threadpool::ThreadPool;
use tracing::{debug, instrument, warn};

type Outcome = Result<ResolvedDependencySet, Vec<DescriptorError>>;

/// Worker count used when the configuration does not name one.
pub fn default_workers() -> usize {
    std::cmp::max(1, num_cpus::get_physical().saturating_sub(1))
}

/// Resolves every descriptor on a worker pool, one job per module.
///
/// Produces the same [`Resolution`] as the sequential
/// [`modrules_common::dependency::resolve_with`]. The context is shared
/// read-only across jobs.
#[instrument(skip_all, name = "resolve_parallel", fields(modules = descriptors.len()))]
pub fn resolve_parallel(
    descriptors: Vec<Arc<Descriptor>>,
    context: Arc<TargetContext>,
    options: ResolveOptions,
    workers: usize,
) -> Resolution {
    let mut resolution = Resolution::default();
    let dupes = resolution.record_duplicates(descriptors.iter().map(|d| d.as_ref()));
    let jobs = descriptors
        .into_iter()
        .filter(|d| !dupes.contains(&d.name))
        .collect();
    run_jobs(&mut resolution, jobs, workers, move |descriptor| {
        resolve_descriptor(descriptor, &context, &options)
    });
    resolution
}

/// Runs `job` for each descriptor on a fresh pool and records the outcomes.
///
/// A module whose job dies before sending a result is recorded as `Aborted`.
fn run_jobs<F>(resolution: &mut Resolution, jobs: Vec<Arc<Descriptor>>, workers: usize, job: F)
where
    F: Fn(&Descriptor) -> Outcome + Send + Sync + 'static,
{
    let num_workers = workers.max(1);
    let pool = ThreadPool::new(num_workers);
    let (result_tx, result_rx) = crossbeam_channel::unbounded();
    debug!("Resolver pool started with {} workers.", num_workers);

    let job = Arc::new(job);
    let mut pending: BTreeSet<ModuleId> = BTreeSet::new();
    for descriptor in jobs {
        let job = Arc::clone(&job);
        let result_tx = result_tx.clone();
        pending.insert(descriptor.name.clone());
        pool.execute(move || {
            let outcome = (*job)(&descriptor);
            debug!("[{}] Resolution job finished, ok: {}", descriptor.name, outcome.is_ok());
            let _ = result_tx.send((descriptor.name.clone(), outcome));
        });
    }
    drop(result_tx);
    let submitted = pending.len();

    for (module, outcome) in result_rx {
        pending.remove(&module);
        if let Err(errs) = &outcome {
            warn!(
                "Resolution failed for module '{}' ({} error(s)), continuing with others.",
                module,
                errs.len()
            );
        }
        resolution.record(module, outcome);
    }
    pool.join();

    if !pending.is_empty() {
        warn!(
            "{} resolution job(s) panicked, no result for: {}",
            pool.panic_count(),
            pending.iter().map(ModuleId::as_str).collect::<Vec<_>>().join(", ")
        );
        for module in pending {
            let error = DescriptorError::new(&module, DescriptorErrorKind::Aborted, module.as_str())
                .with_detail("resolution job panicked");
            resolution.record(module, Err(vec![error]));
        }
    }
    debug!(
        "Resolver pool drained: {} submitted, {} resolved, {} failed",
        submitted,
        resolution.resolved.len(),
        resolution.errors.len()
    );
}
