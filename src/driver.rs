//! Pipeline orchestrator.
//!
//! The orchestrator is single-threaded: it forks a child config for
//! every task before spawning it, posts the task, and blocks on the
//! future at each stage boundary. Parallelism exists across the
//! (varassign round, controlgraph round) axes. After the stages finish
//! (or fail) exactly one sentinel is posted and the workers are joined.

use std::fs;
use std::sync::Arc;
use std::thread;

use crate::callgraph::CallGraph;
use crate::config::{Config, Opt};
use crate::controlgraph::ControlGraph;
use crate::dbgstream;
use crate::errors::GenError;
use crate::tasks::{consumer_loop, submit, TaskFuture, TaskQueue};
use crate::typegraph::TypeGraph;
use crate::varassign::VarAssign;

pub struct Driver {
    config: Config,
}

impl Driver {
    pub fn new(config: Config) -> Self {
        Driver { config }
    }

    /// Run the whole pipeline; workers are always drained, even on
    /// stage failure.
    pub fn run(self) -> Result<(), GenError> {
        if self.config.dumps() {
            fs::write("initial.cfg", self.config.dump())?;
        }

        let nthreads = self.config.get(Opt::PgConsumers)?.max(1) as usize;
        if !self.config.quiet() {
            dbgstream::debug_line(&format!("starting {nthreads} consumer threads"));
        }
        let queue = TaskQueue::new();
        let workers: Vec<thread::JoinHandle<()>> = (0..nthreads)
            .map(|_| {
                let q = Arc::clone(&queue);
                thread::spawn(move || consumer_loop(q))
            })
            .collect();

        let result = self.run_stages(&queue);

        queue.push_sentinel();
        for w in workers {
            let _ = w.join();
        }
        if result.is_ok() && !self.config.quiet() {
            dbgstream::debug_line("done");
        }
        result
    }

    fn run_stages(&self, queue: &TaskQueue) -> Result<(), GenError> {
        // type graph
        let cfg = self.config.fork();
        let fut = submit(queue, move || TypeGraph::generate(cfg));
        let tg = Arc::new(fut.get()?);
        if self.config.dumps() {
            fs::write("initial.types", tg.dump_dot())?;
        }
        if self.config.get(Opt::PgcStopOnTg)? == 1 {
            if !self.config.quiet() {
                dbgstream::debug_line("typegraph done, stopping");
            }
            return Ok(());
        }

        // call graph
        let cfg = self.config.fork();
        let tgc = Arc::clone(&tg);
        let fut = submit(queue, move || CallGraph::generate(cfg, tgc));
        let cg = Arc::new(fut.get()?);
        if self.config.dumps() {
            fs::write("initial.calls", cg.dump_dot())?;
        }
        if self.config.get(Opt::PgcStopOnCg)? == 1 {
            if !self.config.quiet() {
                dbgstream::debug_line("callgraph done, stopping");
            }
            return Ok(());
        }

        // varassign rounds fan out first, then resolve in order
        let nvar = self.config.get(Opt::PgVar)?.max(0);
        let nsplits = self.config.get(Opt::PgSplits)?.max(0);
        let mut assign_futures: Vec<TaskFuture<VarAssign>> = Vec::with_capacity(nvar as usize);
        for _ in 0..nvar {
            let cfg = self.config.fork();
            let tgc = Arc::clone(&tg);
            let cgc = Arc::clone(&cg);
            assign_futures.push(submit(queue, move || VarAssign::generate(cfg, tgc, cgc)));
        }

        let stop_on_va = self.config.get(Opt::PgcStopOnVa)? == 1;
        for (r_var, fut) in assign_futures.into_iter().enumerate() {
            let va = Arc::new(fut.get()?);
            if self.config.dumps() {
                fs::write(format!("varassign.{r_var}"), va.dump())?;
            }
            if !stop_on_va {
                self.run_controlgraphs(queue, r_var, &cg, &va, nsplits)?;
            }
        }
        Ok(())
    }

    fn run_controlgraphs(
        &self,
        queue: &TaskQueue,
        r_var: usize,
        cg: &Arc<CallGraph>,
        va: &Arc<VarAssign>,
        nsplits: i32,
    ) -> Result<(), GenError> {
        let mut futures: Vec<TaskFuture<ControlGraph>> = Vec::with_capacity(nsplits as usize);
        for _ in 0..nsplits {
            let cfg = self.config.fork();
            let cgc = Arc::clone(cg);
            let vac = Arc::clone(va);
            futures.push(submit(queue, move || ControlGraph::generate(cfg, cgc, vac)));
        }

        for (r_split, fut) in futures.into_iter().enumerate() {
            let cn = fut.get()?;
            if self.config.dumps() {
                fs::write(format!("controlgraph.{r_var}.{r_split}"), cn.dump())?;
            }
            if self.config.get(Opt::PgcStopOnCn)? == 1 {
                continue;
            }
            // locIR and exprIR randomizations for this tuple attach here
        }
        Ok(())
    }
}
