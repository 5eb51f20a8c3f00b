//! A simple chassis simulation to demonstrate and tune the control engine.

use std::cell::Cell;

use thermal_control::ports::{Fan, Sensor};
use thermal_control::{ControlEngine, PolicyConfig};

/// A crude model of one thermal domain: heat load pushes the temperature up,
/// airflow pulls it back towards ambient.
struct DomainModel {
    temperature: f64,
    ambient: f64,
    /// Degrees C per tick added by the heat load.
    load: f64,
    /// Cooling per tick per percent of fan speed per degree above ambient.
    airflow_coefficient: f64,
}

impl DomainModel {
    fn new(ambient: f64, load: f64) -> Self {
        Self {
            temperature: ambient,
            ambient,
            load,
            airflow_coefficient: 0.0006,
        }
    }

    fn update(&mut self, fan_speed: f64) {
        let heating = self.load;
        let cooling = (self.temperature - self.ambient) * self.airflow_coefficient * fan_speed;
        self.temperature += heating - cooling;
    }
}

struct SimSensor {
    name: &'static str,
    domain: &'static str,
    setpoint: f64,
    temperature: Cell<f64>,
}

impl Sensor for SimSensor {
    fn name(&self) -> String {
        self.name.to_string()
    }

    fn temperature(&self) -> Option<f64> {
        Some(self.temperature.get())
    }

    fn supports_pid_control(&self) -> bool {
        true
    }

    fn is_controlled_by_pid(&self) -> bool {
        true
    }

    fn pid_domain(&self) -> Option<String> {
        Some(self.domain.to_string())
    }

    fn pid_setpoint(&self) -> Option<f64> {
        Some(self.setpoint)
    }
}

struct SimFan {
    speed: f64,
}

impl Fan for SimFan {
    fn set_speed(&mut self, pct: f64) -> anyhow::Result<bool> {
        self.speed = pct;
        Ok(true)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let policy = PolicyConfig::from_json(
        r#"{
            "pid_domains": {
                "asic": { "KP": 3.0, "KI": 0.05, "KD": 4.0 },
                "cpu":  { "KP": 2.0, "KI": 0.05, "KD": 2.0 }
            },
            "constants": { "interval": 5 },
            "fan_limits": { "min": 30.0, "max": 100.0 }
        }"#,
    )
    .expect("policy is valid");

    let dir = std::env::temp_dir().join("thermal-control-sim");
    let mut engine = ControlEngine::with_csv_dir(policy, &dir);

    let mut asic_model = DomainModel::new(35.0, 2.0);
    let mut cpu_model = DomainModel::new(35.0, 1.2);

    let asic_sensor = SimSensor {
        name: "ASIC",
        domain: "asic",
        setpoint: 90.0,
        temperature: Cell::new(asic_model.temperature),
    };
    let cpu_sensor = SimSensor {
        name: "CPU",
        domain: "cpu",
        setpoint: 75.0,
        temperature: Cell::new(cpu_model.temperature),
    };
    let mut fan = SimFan { speed: 30.0 };

    println!("tick, asic (°C), cpu (°C), fan (%), selected");
    for tick in 0..240 {
        asic_model.update(fan.speed);
        cpu_model.update(fan.speed);
        asic_sensor.temperature.set(asic_model.temperature);
        cpu_sensor.temperature.set(cpu_model.temperature);

        let sensors: Vec<&dyn Sensor> = vec![&asic_sensor, &cpu_sensor];
        let mut fans: Vec<&mut dyn Fan> = vec![&mut fan];
        let report = engine
            .tick(5, &sensors, &mut fans)
            .expect("simulated tick succeeds");
        drop(fans);

        println!(
            "{tick}, {:.2}, {:.2}, {:.1}, {}",
            asic_model.temperature, cpu_model.temperature, report.fan_speed, report.selected_domain
        );
    }
}
