mod payload;

use clap::Parser;
use payload::{DataPayload, RegisterPayload};
use rand::Rng;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use std::time::Duration;
use tracing::{error, info, warn};

/// Publishes fake pen telemetry and presence announcements over MQTT.
#[derive(Debug, Parser)]
#[command(name = "ioternak-simulator")]
struct Args {
    #[arg(long, env = "MQTT_BROKER", default_value = "localhost")]
    broker: String,

    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    port: u16,

    /// Number of simulated devices
    #[arg(long, default_value_t = 5)]
    devices: usize,

    /// Delay between telemetry rounds, in milliseconds
    #[arg(long, default_value_t = 2000)]
    interval_ms: u64,

    /// Emit the payload shapes older firmware uses: array-wrapped bodies
    /// and the "amonia" gas field name
    #[arg(long)]
    quirks: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt::init();

    info!("Starting IoTernak simulator");
    info!(
        "Broker: {}:{}, devices: {}, interval: {}ms, quirks: {}",
        args.broker, args.port, args.devices, args.interval_ms, args.quirks
    );

    let mut rng = rand::thread_rng();
    let client_id = format!("sim-{}", rng.gen::<u32>());

    let mut mqtt_options = MqttOptions::new(&client_id, &args.broker, args.port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    mqtt_options.set_clean_session(true);

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 100);

    tokio::spawn(async move {
        loop {
            if let Err(e) = eventloop.poll().await {
                error!("MQTT eventloop error: {}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    });

    tokio::time::sleep(Duration::from_secs(2)).await;
    info!("Connected to MQTT broker");

    // Announce every device once, the way firmware does on boot.
    for device in 0..args.devices {
        let device_id = format!("sim-dev-{device}");
        let register = RegisterPayload {
            device_name: format!("Kandang Simulasi {device}"),
            device_type: "kandang-sim".to_string(),
        };
        let body = match serde_json::to_string(&register) {
            Ok(b) => b,
            Err(e) => {
                error!("Failed to serialize registration: {}", e);
                continue;
            }
        };

        if let Err(e) = client
            .publish(
                format!("devices/{device_id}/register"),
                QoS::AtLeastOnce,
                false,
                body,
            )
            .await
        {
            warn!("Failed to publish registration for {}: {}", device_id, e);
        }
    }

    info!("Registered {} devices, publishing telemetry", args.devices);

    let mut counter = 0u64;

    loop {
        for device in 0..args.devices {
            let device_id = format!("sim-dev-{device}");
            let data = generate_data(&mut rng, args.quirks);

            // Legacy firmware quirk: occasionally wrap the body in a
            // single-element array.
            let body = if args.quirks && rng.gen_bool(0.1) {
                serde_json::to_string(&[&data])
            } else {
                serde_json::to_string(&data)
            };

            let body = match body {
                Ok(b) => b,
                Err(e) => {
                    error!("Failed to serialize telemetry: {}", e);
                    continue;
                }
            };

            match client
                .publish(
                    format!("devices/{device_id}/data"),
                    QoS::AtLeastOnce,
                    false,
                    body,
                )
                .await
            {
                Ok(()) => counter += 1,
                Err(e) => warn!("Failed to publish for {}: {}", device_id, e),
            }
        }

        if counter % 1000 == 0 && counter > 0 {
            info!("Published {} telemetry messages", counter);
        }

        tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
    }
}

fn generate_data(rng: &mut impl Rng, quirks: bool) -> DataPayload {
    // 5% of readings spike past the default thresholds to exercise alerting.
    let temperature = if rng.gen_bool(0.05) {
        rng.gen_range(36.0..45.0)
    } else {
        rng.gen_range(24.0..34.0)
    };

    let humidity = rng.gen_range(50.0..90.0);

    let gas = if rng.gen_bool(0.05) {
        rng.gen_range(301.0..600.0)
    } else {
        rng.gen_range(5.0..120.0)
    };

    let legacy_field = quirks && rng.gen_bool(0.2);

    DataPayload::new(temperature, humidity, gas, legacy_field)
}
