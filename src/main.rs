fn main() -> anyhow::Result<()> {
    image_classifier_lib::run()
}
