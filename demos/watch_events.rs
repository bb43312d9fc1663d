// Opens a deck and logs its input events until it disconnects.
//
//   cargo run --example watch_events            # first USB deck
//   cargo run --example watch_events 10.0.0.7   # network deck

use image::Rgb;
use streamdeck::{builtin_registry, list_decks, DeckEvent, StreamDeck};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("streamdeck=debug".parse()?),
        )
        .init();

    let registry = builtin_registry();
    let deck = match std::env::args().nth(1) {
        Some(addr) => StreamDeck::open_network(&registry, &addr).await?,
        None => {
            for found in list_decks()? {
                info!(
                    "Attached: {} serial={} pid=0x{:04x}",
                    found.name, found.serial, found.product_id
                );
            }
            StreamDeck::open(&registry).await?
        }
    };

    info!(
        "Watching {} ({} buttons, {} encoders)",
        deck.name(),
        deck.button_count(),
        deck.encoder_count()
    );
    deck.set_brightness(70).await?;
    if deck.has_image_capability() {
        deck.clear_buttons().await?;
    }

    let mut events = deck.subscribe_events();
    loop {
        match events.recv().await {
            Ok(DeckEvent::Button(button)) if button.index() >= 0 => {
                info!("Button {} pressed={}", button.index(), button.is_pressed());
                if button.is_pressed() && deck.has_image_capability() {
                    deck.write_color_to_button(button.index() as usize, Rgb([0, 160, 255]))
                        .await?;
                }
            }
            Ok(event) if event.is_disconnect() => {
                warn!("Deck disconnected");
                break;
            }
            Ok(event) => info!("{:?}", event),
            Err(e) => warn!("Event queue: {}", e),
        }
    }

    Ok(())
}
