//! Pipeline execution for rill.
//!
//! Spawns one task per form, wires conduits between neighbours and waits
//! for every stage before reporting.

use tokio::sync::mpsc;

use crate::ast::Pipeline;
use crate::interpreter::{EvalError, EvalResult, Scope, eval_form};
use crate::value::Status;

use super::pipe_stream::pipe_stream;
use super::ports::{ByteIn, ByteOut, Ports, ValueIn, ValueOut};

/// Runs pipelines in a scope.
pub struct PipelineRunner {
    scope: Scope,
}

impl PipelineRunner {
    pub fn new(scope: Scope) -> Self {
        Self { scope }
    }

    /// Run every stage of `pipeline` concurrently.
    ///
    /// The first stage reads from `ports`' inputs and the last writes to its
    /// outputs. Returns one status per stage, in order. If any stage fails,
    /// the remaining stages still run to completion and the earliest stage's
    /// error is returned.
    #[tracing::instrument(level = "debug", skip_all, fields(stages = pipeline.forms.len()))]
    pub async fn run(&self, pipeline: &Pipeline, ports: &Ports) -> EvalResult<Vec<Status>> {
        let stage_ports = self.wire(pipeline.forms.len(), ports);

        let mut handles = Vec::with_capacity(stage_ports.len());
        for (form, ports) in pipeline.forms.iter().cloned().zip(stage_ports) {
            let scope = self.scope.clone();
            handles.push(tokio::spawn(async move { eval_form(&form, &scope, &ports).await }));
        }

        let mut statuses = Vec::with_capacity(handles.len());
        let mut first_error: Option<EvalError> = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(status)) => statuses.push(status),
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    first_error.get_or_insert(e.into());
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(statuses),
        }
    }

    /// Ports for `n` stages: the outer inputs feed the first, the outer
    /// outputs take the last, and fresh conduits join the rest.
    fn wire(&self, n: usize, outer: &Ports) -> Vec<Ports> {
        let config = self.scope.pipes();
        let mut stages = Vec::with_capacity(n);
        let mut byte_in = outer.byte_in.clone();
        let mut value_in = outer.value_in.clone();

        for i in 0..n {
            if i + 1 == n {
                stages.push(Ports {
                    byte_in,
                    value_in,
                    value_out: outer.value_out.clone(),
                    byte_out: outer.byte_out.clone(),
                });
                break;
            }
            let (writer, reader) = pipe_stream(config.pipe_buffer_size);
            let (tx, rx) = mpsc::channel(config.value_chan_size.max(1));
            stages.push(Ports {
                byte_in,
                value_in,
                value_out: ValueOut::from_channel(tx),
                byte_out: ByteOut::to_pipe(writer),
            });
            byte_in = ByteIn::from_pipe(reader);
            value_in = ValueIn::from_channel(rx);
        }
        stages
    }
}
