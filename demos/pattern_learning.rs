//! Pattern association demo: a three-layer network learns to map four
//! input patterns to four target patterns via error-driven learning.
//!
//! Each epoch presents every pattern for one alpha cycle (100 cycles:
//! three minus-phase quarters, one plus phase with targets clamped),
//! then reports the summed squared error of the minus-phase outputs.
//!
//! Run with: cargo run --example pattern_learning

use ratenet::{Layer, LayerType, NetError, Network, Pattern, PrjnType, Shape, Time};

fn main() -> Result<(), NetError> {
    env_logger::init();

    let mut net = Network::new("pattern_learning", 42);
    let inp = net.add_layer(Layer::new(
        "Input",
        Shape::Grid { y: 2, x: 2 },
        LayerType::Input,
        1,
    ));
    let hid = net.add_layer(Layer::new(
        "Hidden",
        Shape::Grid { y: 3, x: 3 },
        LayerType::Hidden,
        2,
    ));
    let out = net.add_layer(Layer::new(
        "Output",
        Shape::Grid { y: 2, x: 2 },
        LayerType::Target,
        3,
    ));
    let full = Pattern::Full { self_con: false };
    net.connect_layers(inp, hid, full, PrjnType::Forward)?;
    net.connect_layers(hid, out, full, PrjnType::Forward)?;
    net.connect_layers(out, hid, full, PrjnType::Back)?;
    net.build()?;
    net.init_wts();

    // one-hot inputs mapped to rotated one-hot targets
    let pats: [([f32; 4], [f32; 4]); 4] = [
        ([1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0]),
        ([0.0, 1.0, 0.0, 0.0], [0.0, 0.0, 1.0, 0.0]),
        ([0.0, 0.0, 1.0, 0.0], [0.0, 0.0, 0.0, 1.0]),
        ([0.0, 0.0, 0.0, 1.0], [1.0, 0.0, 0.0, 0.0]),
    ];

    let mut time = Time::default();
    for epoch in 0..30 {
        let mut sse = 0.0;
        for (input, target) in &pats {
            net.init_ext();
            net.apply_ext("Input", input)?;
            net.apply_ext("Output", target)?;
            net.alpha_cyc(&mut time, true);
            sse += net.layer(out)?.sse(0.5);
        }
        if epoch % 5 == 0 || epoch == 29 {
            println!("epoch {epoch:3}  sse {sse:.4}");
        }
    }

    let outputs = net.layer(out)?.unit_vals("act_m")?;
    println!("final minus-phase output: {outputs:.3?}");
    Ok(())
}
