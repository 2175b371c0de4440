use keel_server::actor::ActorContext;
use log::{info, warn};
use rand::seq::SliceRandom;

use crate::endpoint::{ApplicationMessage, WorkerMessage};
use crate::id::{ApplicationId, DriverId, WorkerId};
use crate::master::actor::MasterActor;
use crate::master::state::{ApplicationState, MasterStatus};

/// The resource demands of one application during an allocation round.
struct AllocationRequest {
    cores_left: usize,
    memory_per_executor_mb: usize,
    cores_per_executor: Option<usize>,
    /// The number of executors the application already has.
    executor_count: usize,
    executor_limit: usize,
}

/// The free resources of one usable worker during an allocation round.
#[derive(Clone, Copy)]
struct WorkerCapacity {
    cores_free: usize,
    memory_free_mb: usize,
}

/// Decides how many cores to grant to the application on each worker.
///
/// Cores are handed out one executor quantum at a time. With spreading
/// enabled, each round grants one quantum on every worker that can still
/// take one; otherwise a single worker is exhausted before moving on to
/// the next. A worker launching a new executor must have memory for it
/// and must not push the application past its executor limit.
/// Applications without a fixed executor size get at most one executor
/// per worker, so further quanta on such a worker grow that executor and
/// need no additional memory.
fn assign_executor_cores(
    request: &AllocationRequest,
    workers: &[WorkerCapacity],
    spread_out: bool,
) -> Vec<usize> {
    let quantum = request.cores_per_executor.unwrap_or(1);
    // A zero quantum would be handed out forever without consuming any
    // cores, so nothing can be allocated from such a request.
    if quantum == 0 {
        return vec![0; workers.len()];
    }
    let one_executor_per_worker = request.cores_per_executor.is_none();
    let free: usize = workers.iter().map(|x| x.cores_free).sum();
    let mut cores_to_assign = request.cores_left.min(free);
    let mut assigned_cores = vec![0; workers.len()];
    let mut assigned_executors = vec![0; workers.len()];

    let can_launch = |pos: usize,
                      assigned_cores: &[usize],
                      assigned_executors: &[usize],
                      cores_to_assign: usize|
     -> bool {
        if cores_to_assign < quantum {
            return false;
        }
        if workers[pos].cores_free.saturating_sub(assigned_cores[pos]) < quantum {
            return false;
        }
        let launching_new_executor = !one_executor_per_worker || assigned_executors[pos] == 0;
        if launching_new_executor {
            let memory_needed_mb =
                (assigned_executors[pos] + 1) * request.memory_per_executor_mb;
            if workers[pos].memory_free_mb < memory_needed_mb {
                return false;
            }
            let executors = assigned_executors.iter().sum::<usize>() + request.executor_count;
            if executors >= request.executor_limit {
                return false;
            }
        }
        true
    };

    let mut candidates: Vec<usize> = (0..workers.len())
        .filter(|pos| can_launch(*pos, &assigned_cores, &assigned_executors, cores_to_assign))
        .collect();
    while !candidates.is_empty() {
        for pos in &candidates {
            let pos = *pos;
            let mut keep_scheduling = true;
            while keep_scheduling
                && can_launch(pos, &assigned_cores, &assigned_executors, cores_to_assign)
            {
                cores_to_assign -= quantum;
                assigned_cores[pos] += quantum;
                if one_executor_per_worker {
                    assigned_executors[pos] = 1;
                } else {
                    assigned_executors[pos] += 1;
                }
                // Spreading moves on after one quantum per worker.
                keep_scheduling = !spread_out;
            }
        }
        candidates.retain(|pos| {
            can_launch(*pos, &assigned_cores, &assigned_executors, cores_to_assign)
        });
    }
    assigned_cores
}

impl MasterActor {
    /// Runs one scheduling pass over the waiting drivers and the
    /// applications that still want cores. This is called whenever the
    /// cluster state changes in a way that may free or demand resources.
    pub(super) fn schedule(&mut self, ctx: &mut ActorContext<Self>) {
        if self.state.status != MasterStatus::Alive {
            return;
        }
        self.schedule_drivers(ctx);
        self.start_executors_on_workers(ctx);
    }

    /// Launches waiting drivers in submission order. Alive workers are
    /// visited round-robin from a shuffled order so that drivers are not
    /// piled onto the same worker.
    fn schedule_drivers(&mut self, ctx: &mut ActorContext<Self>) {
        let mut alive_workers: Vec<WorkerId> = self
            .state
            .workers()
            .filter(|(_, worker)| worker.is_alive())
            .map(|(worker_id, _)| worker_id.clone())
            .collect();
        alive_workers.shuffle(&mut self.rng);
        let num_alive = alive_workers.len();
        let mut cur_pos = 0;
        for driver_id in self.state.waiting_driver_ids() {
            let mut launched = false;
            let mut cluster_idle = true;
            let mut visited = 0;
            while visited < num_alive && !launched {
                let worker_id = &alive_workers[cur_pos];
                visited += 1;
                let fits = match (
                    self.state.get_worker(worker_id),
                    self.state.get_driver(&driver_id),
                ) {
                    (Some(worker), Some(driver)) => {
                        cluster_idle = worker.drivers.is_empty() && worker.executors.is_empty();
                        worker.memory_free_mb() >= driver.description.memory_mb
                            && worker.cores_free() >= driver.description.cores
                    }
                    _ => false,
                };
                if fits {
                    self.launch_driver(ctx, &driver_id, worker_id);
                    launched = true;
                }
                cur_pos = (cur_pos + 1) % num_alive;
            }
            if !launched && cluster_idle {
                warn!("driver {driver_id} requires more resources than any worker has");
            }
        }
    }

    fn launch_driver(
        &mut self,
        ctx: &mut ActorContext<Self>,
        driver_id: &DriverId,
        worker_id: &WorkerId,
    ) {
        info!("launching driver {driver_id} on worker {worker_id}");
        if let Err(e) = self.state.attach_driver(driver_id, worker_id) {
            warn!("failed to launch driver {driver_id}: {e}");
            return;
        }
        self.state.remove_waiting_driver(driver_id);
        let Some(driver) = self.state.get_driver(driver_id) else {
            return;
        };
        let message = WorkerMessage::LaunchDriver {
            driver_id: driver_id.clone(),
            driver: driver.description.clone(),
        };
        self.send_to_worker(ctx, worker_id, message);
    }

    /// Allocates executors for applications in registration order.
    fn start_executors_on_workers(&mut self, ctx: &mut ActorContext<Self>) {
        let schedulable: Vec<ApplicationId> = self
            .state
            .applications()
            .filter(|(_, application)| {
                matches!(
                    application.state,
                    ApplicationState::Waiting | ApplicationState::Running
                )
            })
            .map(|(application_id, _)| application_id.clone())
            .collect();
        let spread_out = self.options().spread_out_applications;
        for application_id in &schedulable {
            let Some(application) = self.state.get_application(application_id) else {
                continue;
            };
            let quantum = application.description.cores_per_executor.unwrap_or(1);
            // Cores below one executor quantum cannot be allocated.
            if application.cores_left() < quantum {
                continue;
            }
            let request = AllocationRequest {
                cores_left: application.cores_left(),
                memory_per_executor_mb: application.description.memory_per_executor_mb,
                cores_per_executor: application.description.cores_per_executor,
                executor_count: application.executors.len(),
                executor_limit: application.executor_limit,
            };
            let has_executors = !application.executors.is_empty();
            let mut usable: Vec<(WorkerId, WorkerCapacity)> = self
                .state
                .workers()
                .filter(|(_, worker)| {
                    worker.is_alive()
                        && worker.memory_free_mb() >= request.memory_per_executor_mb
                        && worker.cores_free() >= quantum
                })
                .map(|(worker_id, worker)| {
                    (
                        worker_id.clone(),
                        WorkerCapacity {
                            cores_free: worker.cores_free(),
                            memory_free_mb: worker.memory_free_mb(),
                        },
                    )
                })
                .collect();
            usable.sort_by(|a, b| b.1.cores_free.cmp(&a.1.cores_free));
            if schedulable.len() == 1 && !has_executors && usable.is_empty() {
                warn!(
                    "application {application_id} requires more resources than any worker has"
                );
            }
            let capacities: Vec<WorkerCapacity> = usable.iter().map(|(_, x)| *x).collect();
            let assigned = assign_executor_cores(&request, &capacities, spread_out);
            for (pos, (worker_id, _)) in usable.iter().enumerate() {
                if assigned[pos] > 0 {
                    self.allocate_worker_resources(
                        ctx,
                        application_id,
                        worker_id,
                        assigned[pos],
                        request.cores_per_executor,
                    );
                }
            }
        }
    }

    /// Turns the cores assigned on one worker into executor launches.
    /// With a fixed executor size the cores are split into that many
    /// executors; otherwise they form a single executor.
    fn allocate_worker_resources(
        &mut self,
        ctx: &mut ActorContext<Self>,
        application_id: &ApplicationId,
        worker_id: &WorkerId,
        assigned_cores: usize,
        cores_per_executor: Option<usize>,
    ) {
        let executor_count = cores_per_executor
            .map(|x| assigned_cores / x)
            .unwrap_or(1);
        let cores_each = cores_per_executor.unwrap_or(assigned_cores);
        let Some((host, port)) = self
            .state
            .get_worker(worker_id)
            .map(|worker| (worker.host.clone(), worker.port))
        else {
            return;
        };
        for _ in 0..executor_count {
            let key = match self
                .state
                .attach_executor(application_id, worker_id, cores_each)
            {
                Ok(key) => key,
                Err(e) => {
                    warn!("failed to create executor for application {application_id}: {e}");
                    return;
                }
            };
            let Some(application) = self.state.get_application_mut(application_id) else {
                return;
            };
            application.state = ApplicationState::Running;
            let description = application.description.clone();
            let memory_mb = description.memory_per_executor_mb;
            info!("launching executor {key} on worker {worker_id}");
            self.send_to_worker(
                ctx,
                worker_id,
                WorkerMessage::LaunchExecutor {
                    master_url: self.master_url(),
                    application_id: application_id.clone(),
                    executor_id: key.executor_id,
                    application: description,
                    cores: cores_each,
                    memory_mb,
                },
            );
            self.send_to_application(
                ctx,
                application_id,
                ApplicationMessage::ExecutorAdded {
                    executor_id: key.executor_id,
                    worker_id: worker_id.clone(),
                    host: host.clone(),
                    port,
                    cores: cores_each,
                    memory_mb,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{assign_executor_cores, AllocationRequest, WorkerCapacity};

    fn request(cores_left: usize, cores_per_executor: Option<usize>) -> AllocationRequest {
        AllocationRequest {
            cores_left,
            memory_per_executor_mb: 1024,
            cores_per_executor,
            executor_count: 0,
            executor_limit: usize::MAX,
        }
    }

    fn worker(cores_free: usize, memory_free_mb: usize) -> WorkerCapacity {
        WorkerCapacity {
            cores_free,
            memory_free_mb,
        }
    }

    #[test]
    fn test_spreading_assigns_cores_round_robin() {
        let workers = vec![worker(4, 4096), worker(4, 4096)];
        let assigned = assign_executor_cores(&request(4, Some(1)), &workers, true);
        assert_eq!(assigned, vec![2, 2]);
    }

    #[test]
    fn test_stacking_fills_one_worker_first() {
        let workers = vec![worker(4, 4096), worker(4, 4096)];
        let assigned = assign_executor_cores(&request(4, Some(1)), &workers, false);
        assert_eq!(assigned, vec![4, 0]);
    }

    #[test]
    fn test_memory_limits_the_executors_on_a_worker() {
        let workers = vec![worker(8, 4096)];
        let mut request = request(8, Some(1));
        request.memory_per_executor_mb = 2048;
        let assigned = assign_executor_cores(&request, &workers, false);
        assert_eq!(assigned, vec![2]);
    }

    #[test]
    fn test_flexible_applications_get_one_executor_per_worker() {
        // Without a fixed executor size, all cores assigned on a worker
        // grow a single executor, so its memory is only counted once.
        let workers = vec![worker(8, 1024)];
        let assigned = assign_executor_cores(&request(5, None), &workers, false);
        assert_eq!(assigned, vec![5]);
    }

    #[test]
    fn test_executor_limit_caps_new_executors() {
        let workers = vec![worker(8, 8192)];
        let mut request = request(8, Some(2));
        request.executor_count = 1;
        request.executor_limit = 2;
        let assigned = assign_executor_cores(&request, &workers, false);
        assert_eq!(assigned, vec![2]);
    }

    #[test]
    fn test_cores_below_the_quantum_are_not_assigned() {
        let workers = vec![worker(8, 8192)];
        let assigned = assign_executor_cores(&request(5, Some(2)), &workers, false);
        assert_eq!(assigned, vec![4]);
    }

    #[test]
    fn test_a_zero_executor_quantum_is_never_granted() {
        // The assignment must terminate even though zero-core quanta
        // always fit on any worker.
        let workers = vec![worker(4, 4096)];
        let mut request = request(2, Some(0));
        request.memory_per_executor_mb = 0;
        let assigned = assign_executor_cores(&request, &workers, true);
        assert_eq!(assigned, vec![0]);
    }
}
