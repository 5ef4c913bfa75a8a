fn main() {
    pomoguard_lib::run()
}
