pub mod apple_music;
