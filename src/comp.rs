//! Computation cores: a fused multiply-accumulate stage feeding a sigmoid
//! activation stage, composed by `ComputCore`.
//!
//! The pipeline is two registers deep: the accumulator result commits one
//! edge after the input settles and the activation one edge after that.
//! `ComputCore` republishes the assigned `ComputationData` with the
//! settled activation as `output` and pulses `ready`; the embedded neuron
//! id is how the dispatch unit routes the result.

use std::sync::{Arc, RwLock};

use crate::base::{Scheduler, Signal};
use crate::netz::data::NeuronData;
use crate::sim::config::Fp;

/// Work order for one core: the neuron record plus a snapshot of the
/// layer inputs. `inputs.len()` must equal `data.weights_count` when a
/// core is activated.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComputationData {
    pub data: NeuronData,
    pub inputs: Vec<Fp>,
    pub output: Fp,
}

pub fn sigmoid(x: Fp) -> Fp {
    1.0 / (1.0 + (-x).exp())
}

pub struct AccumulationCorePorts {
    pub rst: Signal<bool>,
    pub data: Signal<ComputationData>,
    pub result: Signal<Fp>,
}

/// Dot product of the neuron's weights with the input snapshot.
pub struct AccumulationCore {
    product_next: Fp,
    ports: AccumulationCorePorts,
}

impl AccumulationCore {
    pub fn instantiate(
        sched: &mut Scheduler,
        name: &str,
        ports: AccumulationCorePorts,
    ) -> Arc<RwLock<Self>> {
        let data_sensitivity = [ports.data.id()];
        let me = Arc::new(RwLock::new(AccumulationCore {
            product_next: 0.0,
            ports,
        }));

        let core = Arc::clone(&me);
        sched.method_on_edge(&format!("{name}.at_clk"), move || {
            core.write().expect("lock poisoned").at_clk()
        });
        let core = Arc::clone(&me);
        sched.method(&format!("{name}.at_data"), &data_sensitivity, move || {
            core.write().expect("lock poisoned").at_data()
        });

        me
    }

    fn at_clk(&mut self) {
        if self.ports.rst.read() {
            self.ports.result.write(0.0);
        } else {
            self.ports.result.write(self.product_next);
        }
    }

    fn at_data(&mut self) {
        let data = self.ports.data.read();
        assert_eq!(
            data.data.weights_count as usize,
            data.inputs.len(),
            "weights and inputs are of different sizes"
        );

        self.product_next = 0.0;
        for i in 0..data.data.weights_count as usize {
            self.product_next += data.data.weights[i] * data.inputs[i];
        }
    }
}

pub struct ActivationCorePorts {
    pub rst: Signal<bool>,
    pub data: Signal<Fp>,
    pub result: Signal<Fp>,
}

pub struct ActivationCore {
    result_next: Fp,
    ports: ActivationCorePorts,
}

impl ActivationCore {
    pub fn instantiate(
        sched: &mut Scheduler,
        name: &str,
        ports: ActivationCorePorts,
    ) -> Arc<RwLock<Self>> {
        let data_sensitivity = [ports.data.id()];
        // Staged value starts at sigma(0): the committed result always
        // reflects the current input, even before the first input change.
        let me = Arc::new(RwLock::new(ActivationCore {
            result_next: sigmoid(0.0),
            ports,
        }));

        let core = Arc::clone(&me);
        sched.method_on_edge(&format!("{name}.at_clk"), move || {
            core.write().expect("lock poisoned").at_clk()
        });
        let core = Arc::clone(&me);
        sched.method(&format!("{name}.at_data"), &data_sensitivity, move || {
            core.write().expect("lock poisoned").at_data()
        });

        me
    }

    fn at_clk(&mut self) {
        if self.ports.rst.read() {
            self.ports.result.write(0.0);
        } else {
            self.ports.result.write(self.result_next);
        }
    }

    fn at_data(&mut self) {
        self.result_next = sigmoid(self.ports.data.read());
    }
}

pub struct ComputCorePorts {
    pub rst: Signal<bool>,
    pub input_data: Signal<ComputationData>,
    pub output_data: Signal<ComputationData>,
    pub ready: Signal<bool>,
}

/// Edges from an assignment until the activation result is committed and
/// readable: one for the accumulator register, one for the activation
/// register, one to latch it.
const SETTLE_LATENCY: u8 = 3;

pub struct ComputCore {
    compdata_current: ComputationData,
    output_data_next: ComputationData,
    ready_next: bool,
    settle_countdown: u8,
    activator_out: Signal<Fp>,
    ports: ComputCorePorts,
}

impl ComputCore {
    pub fn instantiate(
        sched: &mut Scheduler,
        name: &str,
        ports: ComputCorePorts,
    ) -> Arc<RwLock<Self>> {
        let accumulator_out = sched.signal::<Fp>(&format!("{name}.accumulator_out"));
        let activator_out = sched.signal::<Fp>(&format!("{name}.activator_out"));

        AccumulationCore::instantiate(
            sched,
            &format!("{name}.accumulator"),
            AccumulationCorePorts {
                rst: ports.rst.clone(),
                data: ports.input_data.clone(),
                result: accumulator_out.clone(),
            },
        );
        ActivationCore::instantiate(
            sched,
            &format!("{name}.activator"),
            ActivationCorePorts {
                rst: ports.rst.clone(),
                data: accumulator_out,
                result: activator_out.clone(),
            },
        );

        let input_sensitivity = [ports.input_data.id()];

        let me = Arc::new(RwLock::new(ComputCore {
            compdata_current: ComputationData::default(),
            output_data_next: ComputationData::default(),
            ready_next: false,
            settle_countdown: 0,
            activator_out,
            ports,
        }));

        let core = Arc::clone(&me);
        sched.method_on_edge(&format!("{name}.at_clk"), move || {
            core.write().expect("lock poisoned").at_clk()
        });
        let core = Arc::clone(&me);
        sched.method(&format!("{name}.at_input_data"), &input_sensitivity, move || {
            core.write().expect("lock poisoned").at_input_data()
        });

        me
    }

    fn at_clk(&mut self) {
        if self.ports.rst.read() {
            self.ports.output_data.write(ComputationData::default());
            self.compdata_current = ComputationData::default();
            self.output_data_next = ComputationData::default();
            self.ready_next = false;
            self.settle_countdown = 0;
        } else {
            if self.settle_countdown > 0 {
                self.settle_countdown -= 1;
                if self.settle_countdown == 0 {
                    self.at_output_ready();
                }
            }
            self.ports.output_data.write(self.output_data_next.clone());
            self.ports.ready.write(self.ready_next);
        }
    }

    fn at_input_data(&mut self) {
        self.compdata_current = self.ports.input_data.read();
        self.ready_next = false;
        self.settle_countdown = SETTLE_LATENCY;
    }

    /// Latch the settled activation under the assigned record.
    fn at_output_ready(&mut self) {
        self.output_data_next = self.compdata_current.clone();
        self.output_data_next.output = self.activator_out.read();
        self.ready_next = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigmoid_reference_points() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!((sigmoid(2.0) - 0.880_797).abs() < 1e-6);
        assert!((sigmoid(-2.0) - 0.119_203).abs() < 1e-6);
    }
}
